//! Document processing: page relevance, budgeted summarization, and corpus retrieval.

pub mod chunking;
pub mod index;
pub mod persist;
pub mod prompts;
pub mod rate_limit;
pub mod reduce;
pub mod relevance;
pub mod retrieval;
mod service;
pub mod summarize;
pub mod types;

pub use index::{EmbeddingIndex, SimilarityResult};
pub use service::{ProcessingApi, ProcessingService};
pub use types::{
    AnswerOutcome, DocumentUpload, ErrorKind, ProcessingError, SummarizeOutcome, SummaryRecord,
};
