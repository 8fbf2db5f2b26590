//! PDF text extraction via pdf-extract.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use super::txt::split_paragraphs;
use super::{ExtractError, TextExtractor};

/// Extractor for PDF files.
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn extensions(&self) -> &[&'static str] {
        &["pdf"]
    }

    fn read_paragraphs(&self, path: &Path) -> Result<Vec<String>, ExtractError> {
        let bytes = std::fs::read(path).map_err(|e| ExtractError::io(path, e))?;
        let text = extract_pdf_text(&bytes).map_err(|e| ExtractError::parse(path, e))?;

        Ok(split_paragraphs(&text))
    }
}

/// Extract text from PDF bytes.
///
/// pdf-extract panics on some malformed documents, which must not take down
/// the whole batch.
fn extract_pdf_text(bytes: &[u8]) -> Result<String, String> {
    match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes))) {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err("pdf-extract panicked while decoding the document".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_paragraphs;

    /// Single-page PDF with one Helvetica text line per `(text, y)` pair.
    fn minimal_pdf(lines: &[(&str, u32)]) -> Vec<u8> {
        let content: String = lines
            .iter()
            .map(|(text, y)| format!("BT /F1 12 Tf 72 {y} Td ({text}) Tj ET\n"))
            .collect();

        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
             /Resources << /Font << /F1 5 0 R >> >> >>"
                .to_string(),
            format!(
                "<< /Length {} >>\nstream\n{}endstream",
                content.len(),
                content
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
        ];

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }

        let xref_start = pdf.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            xref.push_str(&format!("{offset:010} 00000 n \n"));
        }
        pdf.extend_from_slice(xref.as_bytes());
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref_start
            )
            .as_bytes(),
        );
        pdf
    }

    #[test]
    fn test_text_layer_becomes_cleaned_paragraphs() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("report.pdf");
        std::fs::write(
            &path,
            minimal_pdf(&[
                ("Solar panels convert sunlight", 700),
                ("Revenue grew twelve percent", 400),
            ]),
        )
        .unwrap();

        let paragraphs = extract_paragraphs(&PdfExtractor, &path).unwrap();

        assert!(!paragraphs.is_empty());
        for paragraph in &paragraphs {
            assert!(!paragraph.is_empty());
            assert!(!paragraph.contains(['\n', '\t']));
            assert_eq!(paragraph.trim(), paragraph);
        }
        let joined = paragraphs.join(" ");
        assert!(joined.contains("Solar panels convert sunlight"), "{joined:?}");
        assert!(joined.contains("Revenue grew twelve percent"), "{joined:?}");
    }

    #[test]
    fn test_raw_text_split_on_blank_lines() {
        let text = extract_pdf_text(&minimal_pdf(&[("Only line", 700)])).unwrap();
        let raw = split_paragraphs(&text);

        assert!(raw.iter().any(|p| p.contains("Only line")));
        assert!(raw.iter().all(|p| !p.contains("\n\n")));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        let result = PdfExtractor.read_paragraphs(&path);
        assert!(matches!(result, Err(ExtractError::Parse { .. })));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = PdfExtractor.read_paragraphs(Path::new("/nonexistent/doc.pdf"));
        assert!(matches!(result, Err(ExtractError::Io { .. })));
    }
}
