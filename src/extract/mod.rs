//! Paragraph extraction from corpus files.
//!
//! - `txt`: plain UTF-8 text, paragraphs split on blank lines
//! - `pdf`: text layer via pdf-extract
//! - `docx`: `word/document.xml` paragraphs
//!
//! Extractors only produce raw paragraphs. Cleaning is shared and lives in
//! [`clean_text`], applied by [`extract_paragraphs`].

mod docx;
mod pdf;
mod txt;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use docx::DocxExtractor;
pub use pdf::PdfExtractor;
pub use txt::TxtExtractor;

/// Content extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("no extractor registered for '{extension}' ({})", .path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

impl ExtractError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn parse(path: &Path, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Reads the raw paragraphs of one file format.
pub trait TextExtractor: Send + Sync {
    /// Name of this extractor for logging
    fn name(&self) -> &'static str;

    /// Lowercase extensions without the dot
    fn extensions(&self) -> &[&'static str];

    /// Paragraphs in document order, before cleaning.
    fn read_paragraphs(&self, path: &Path) -> Result<Vec<String>, ExtractError>;
}

/// Replace newlines and tabs with spaces and trim the result.
pub fn clean_text(text: &str) -> String {
    text.replace(['\n', '\t'], " ").trim().to_string()
}

/// Extract cleaned, non-empty paragraphs from `path`.
pub fn extract_paragraphs(
    extractor: &dyn TextExtractor,
    path: &Path,
) -> Result<Vec<String>, ExtractError> {
    let paragraphs = extractor
        .read_paragraphs(path)?
        .iter()
        .map(|p| clean_text(p))
        .filter(|p| !p.is_empty())
        .collect();

    Ok(paragraphs)
}

/// Lowercased extension of `path`, without the dot.
fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
}

/// Extension to extractor table.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the TXT, PDF and DOCX extractors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(TxtExtractor);
        registry.register(PdfExtractor);
        registry.register(DocxExtractor);
        registry
    }

    /// Register an extractor for every extension it declares.
    ///
    /// A later registration replaces an earlier one for the same extension.
    pub fn register<E: TextExtractor + 'static>(&mut self, extractor: E) {
        let extractor: Arc<dyn TextExtractor> = Arc::new(extractor);
        for ext in extractor.extensions() {
            self.extractors.insert(ext.to_string(), Arc::clone(&extractor));
        }
    }

    /// Get the extractor for a file based on its extension.
    pub fn get_for_file(&self, path: &Path) -> Option<Arc<dyn TextExtractor>> {
        extension_of(path).and_then(|ext| self.extractors.get(&ext).cloned())
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.extractors.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }

    /// Extract cleaned paragraphs from a file.
    pub fn extract(&self, path: &Path) -> Result<Vec<String>, ExtractError> {
        let extractor =
            self.get_for_file(path)
                .ok_or_else(|| ExtractError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    extension: extension_of(path).unwrap_or_default(),
                })?;

        log::debug!("extractor={} file={}", extractor.name(), path.display());
        extract_paragraphs(extractor.as_ref(), path)
    }
}
