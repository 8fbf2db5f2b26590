//! DOCX paragraph extraction.
//!
//! A .docx file is a zip archive; body text lives in `word/document.xml`
//! as `<w:p>` paragraphs made of `<w:t>` runs.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::{ExtractError, TextExtractor};

const DOCUMENT_PART: &str = "word/document.xml";

/// Extractor for Word documents.
pub struct DocxExtractor;

impl TextExtractor for DocxExtractor {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn extensions(&self) -> &[&'static str] {
        &["docx"]
    }

    fn read_paragraphs(&self, path: &Path) -> Result<Vec<String>, ExtractError> {
        let file = File::open(path).map_err(|e| ExtractError::io(path, e))?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| ExtractError::parse(path, e.to_string()))?;

        let mut xml = String::new();
        archive
            .by_name(DOCUMENT_PART)
            .map_err(|e| ExtractError::parse(path, format!("{DOCUMENT_PART}: {e}")))?
            .read_to_string(&mut xml)
            .map_err(|e| ExtractError::io(path, e))?;

        parse_document_xml(&xml).map_err(|e| ExtractError::parse(path, e))
    }
}

/// Collect the text of every non-blank `<w:p>` in document order.
fn parse_document_xml(xml: &str) -> Result<Vec<String>, String> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| e.to_string())?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "XML error at position {}: {e}",
                    reader.buffer_position()
                ))
            }
        }
    }

    Ok(paragraphs)
}
