use std::path::Path;

use super::{ExtractError, TextExtractor};

/// Extractor for plain text files.
pub struct TxtExtractor;

impl TextExtractor for TxtExtractor {
    fn name(&self) -> &'static str {
        "txt"
    }

    fn extensions(&self) -> &[&'static str] {
        &["txt"]
    }

    fn read_paragraphs(&self, path: &Path) -> Result<Vec<String>, ExtractError> {
        let content = std::fs::read_to_string(path).map_err(|e| ExtractError::io(path, e))?;
        Ok(split_paragraphs(&content))
    }
}

/// Split on blank lines. Windows line endings are normalised first.
pub(crate) fn split_paragraphs(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(str::to_string)
        .collect()
}
