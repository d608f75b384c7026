//! Core data types and error definitions for the processing pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::completion::CompletionClientError;
use crate::embedding::EmbeddingClientError;
use crate::extraction::ExtractionError;

use super::index::{IndexError, SimilarityResult};

/// Coarse classification of processing failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The caller supplied something unusable; no external service was called.
    Input,
    /// An embedding, generation, or extraction collaborator failed.
    UpstreamService,
    /// Temporary or output storage could not be created or released.
    Resource,
}

/// Errors emitted by the summarization and answering pipelines.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Request rejected before any external call.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Page extraction failed for the whole document.
    #[error("Failed to extract document text: {0}")]
    Extraction(#[from] ExtractionError),
    /// Completion provider failed.
    #[error("Completion request failed: {0}")]
    Completion(#[from] CompletionClientError),
    /// Embedding provider failed.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Index construction or lookup failed.
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
    /// Temporary or output storage failed.
    #[error("Storage error: {0}")]
    Resource(String),
}

impl ProcessingError {
    /// Classify the error for callers deciding how to report it.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::Input,
            Self::Index(IndexError::EmptyCorpus) => ErrorKind::Input,
            Self::Index(_) => ErrorKind::UpstreamService,
            Self::Extraction(ExtractionError::Io(_)) => ErrorKind::Resource,
            Self::Extraction(_) | Self::Completion(_) | Self::Embedding(_) => {
                ErrorKind::UpstreamService
            }
            Self::Resource(_) => ErrorKind::Resource,
        }
    }
}

/// Uploaded document handed to the summarization pipeline.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    /// Original file name; used for type checks and the summary record.
    pub file_name: String,
    /// Raw document bytes.
    pub bytes: Vec<u8>,
}

/// Result of a successful summarization job.
#[derive(Debug, Clone)]
pub struct SummarizeOutcome {
    /// Identifier assigned to the job.
    pub job_id: String,
    /// Final structured summary.
    pub final_summary: String,
    /// Page summaries keyed by 1-based page number.
    pub page_summaries: BTreeMap<u32, String>,
    /// Pages skipped by the relevance filter or failed extraction.
    pub skipped_pages: Vec<u32>,
    /// Location of the persisted summary record, when persistence is enabled.
    pub summary_file: Option<PathBuf>,
}

/// Persisted summary record.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRecord {
    /// Identifier assigned to the job.
    pub job_id: String,
    /// Original document file name.
    pub document_name: String,
    /// Hex SHA-256 digest of the document bytes.
    pub document_sha256: String,
    /// RFC 3339 completion timestamp.
    pub timestamp: String,
    /// Page summaries keyed by page number.
    pub page_summaries: BTreeMap<u32, String>,
    /// Final structured summary.
    pub final_summary: String,
}

/// Answer grounded in retrieved corpus chunks.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    /// Question as asked.
    pub question: String,
    /// Raw answer text from the completion provider.
    pub answer: String,
    /// Retrieved chunks with their similarity scores, best first.
    pub evidence: Vec<SimilarityResult>,
}
