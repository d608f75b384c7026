//! Page text extraction and temporary document handling.
//!
//! Extraction is delegated to external tooling: `pdftotext` renders each PDF page as text and
//! separates pages with a form feed. Uploaded bytes are written to a [`MaterializedDocument`],
//! a named temporary file removed when the value is dropped, so every exit path of a job
//! releases it.

use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::config::{Config, ExtractorKind};

const PAGE_SEPARATOR: u8 = 0x0c;

/// Errors raised while turning a document into per-page text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The extraction tool could not be started.
    #[error("Extraction tool unavailable: {0}")]
    ToolUnavailable(String),
    /// The extraction tool ran but reported a failure.
    #[error("Text extraction failed: {0}")]
    Failed(String),
    /// Reading the document from disk failed.
    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw text of one page, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    /// 1-based page number.
    pub number: u32,
    /// Extracted text, or `None` when this page could not be decoded.
    pub text: Option<String>,
}

/// Interface implemented by page extraction backends.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Whether a document with this file name can be handled.
    fn accepts(&self, file_name: &str) -> bool;

    /// File suffix used when materializing uploads for this extractor.
    fn suffix(&self) -> &'static str;

    /// Produce the ordered per-page text of the document at `path`.
    async fn extract_pages(&self, path: &Path) -> Result<Vec<ExtractedPage>, ExtractionError>;
}

/// Extracts PDF pages by running poppler's `pdftotext`.
pub struct PdftotextExtractor {
    binary: String,
}

impl PdftotextExtractor {
    /// Create an extractor invoking `binary` (usually `pdftotext`).
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl PageExtractor for PdftotextExtractor {
    fn accepts(&self, file_name: &str) -> bool {
        file_name.to_lowercase().ends_with(".pdf")
    }

    fn suffix(&self) -> &'static str {
        ".pdf"
    }

    async fn extract_pages(&self, path: &Path) -> Result<Vec<ExtractedPage>, ExtractionError> {
        let output = tokio::process::Command::new(&self.binary)
            .arg("-layout")
            .arg(path)
            .arg("-")
            .output()
            .await
            .map_err(|error| ExtractionError::ToolUnavailable(format!("{}: {error}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::Failed(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        let pages = split_pages(&output.stdout);
        tracing::debug!(pages = pages.len(), "Extracted PDF pages");
        Ok(pages)
    }
}

/// Reads text files whose pages are separated by form feeds.
#[derive(Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    /// Create a plain text extractor.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PageExtractor for PlainTextExtractor {
    fn accepts(&self, file_name: &str) -> bool {
        file_name.to_lowercase().ends_with(".txt")
    }

    fn suffix(&self) -> &'static str {
        ".txt"
    }

    async fn extract_pages(&self, path: &Path) -> Result<Vec<ExtractedPage>, ExtractionError> {
        let bytes = tokio::fs::read(path).await?;
        Ok(split_pages(&bytes))
    }
}

/// Build the page extractor selected by configuration.
pub fn get_page_extractor(config: &Config) -> Arc<dyn PageExtractor> {
    match config.extractor {
        ExtractorKind::Pdftotext => Arc::new(PdftotextExtractor::new(config.pdftotext_bin.clone())),
        ExtractorKind::PlainText => Arc::new(PlainTextExtractor::new()),
    }
}

/// Split raw extractor output into pages on form feeds.
///
/// A trailing form feed does not open an extra page. Pages that are not valid UTF-8 are kept
/// as failed extractions so numbering stays aligned with the document.
pub(crate) fn split_pages(raw: &[u8]) -> Vec<ExtractedPage> {
    if raw.is_empty() {
        return Vec::new();
    }
    let body = raw.strip_suffix(&[PAGE_SEPARATOR]).unwrap_or(raw);
    body.split(|byte| *byte == PAGE_SEPARATOR)
        .enumerate()
        .map(|(idx, bytes)| ExtractedPage {
            number: idx as u32 + 1,
            text: String::from_utf8(bytes.to_vec()).ok(),
        })
        .collect()
}

/// Uploaded document written to a scoped temporary file.
///
/// The file is deleted on drop; [`MaterializedDocument::release`] surfaces deletion errors on
/// the success path.
pub struct MaterializedDocument {
    file: NamedTempFile,
}

impl MaterializedDocument {
    /// Write `bytes` to a fresh temporary file with the given suffix.
    pub fn write(bytes: &[u8], suffix: &str) -> std::io::Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("docbrief-")
            .suffix(suffix)
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self { file })
    }

    /// Location of the materialized document.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Delete the temporary file, reporting failures.
    pub fn release(self) -> std::io::Result<()> {
        self.file.close()
    }
}
