//! Processing service coordinating extraction, summarization, persistence, and answering.

use crate::{
    completion::{CompletionClient, get_completion_client},
    config::Config,
    embedding::{EmbeddingClient, get_embedding_client},
    extraction::{MaterializedDocument, PageExtractor, get_page_extractor},
    metrics::{MetricsSnapshot, ServiceMetrics},
    processing::{
        persist::{document_digest, persist_summary, timestamp_now},
        rate_limit::build_token_estimator,
        retrieval::{AnswerSettings, RetrievalService},
        summarize::{SummarizationPipeline, SummarizerSettings},
        types::{AnswerOutcome, DocumentUpload, ProcessingError, SummarizeOutcome, SummaryRecord},
    },
};
use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Abstraction over the processing pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Summarize an uploaded document page by page and fold the result into one overview.
    async fn summarize(&self, upload: DocumentUpload) -> Result<SummarizeOutcome, ProcessingError>;

    /// Answer a question from the indexed corpus.
    async fn answer(&self, question: String) -> Result<AnswerOutcome, ProcessingError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns the long-lived collaborators shared by every request.
///
/// The corpus index is built once during construction and only read afterwards. Summarization
/// jobs share nothing mutable; each one gets its own token budget inside the pipeline.
/// Construct the service once near process start and share it through an `Arc`.
pub struct ProcessingService {
    extractor: Arc<dyn PageExtractor>,
    pipeline: SummarizationPipeline,
    retrieval: Option<RetrievalService>,
    summary_dir: Option<PathBuf>,
    metrics: Arc<ServiceMetrics>,
}

impl ProcessingService {
    /// Assemble a service from explicit collaborators.
    pub fn new(
        extractor: Arc<dyn PageExtractor>,
        pipeline: SummarizationPipeline,
        retrieval: Option<RetrievalService>,
        summary_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            extractor,
            pipeline,
            retrieval,
            summary_dir,
            metrics: Arc::new(ServiceMetrics::new()),
        }
    }

    /// Build the service from configuration, indexing the corpus when one is configured.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        tracing::info!(provider = ?config.llm_provider, "Initializing completion client");
        let completion = get_completion_client(config);
        let estimator = build_token_estimator(&config.token_estimator)
            .with_context(|| format!("unknown token estimator '{}'", config.token_estimator))?;
        let pipeline = SummarizationPipeline::new(
            completion.clone(),
            SummarizerSettings::from_config(config),
            estimator,
        );

        let retrieval = match &config.corpus_path {
            Some(path) => {
                let corpus = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("failed to read corpus {}", path.display()))?;
                let embedder = get_embedding_client(config);
                let service = build_retrieval(config, &corpus, embedder, completion).await?;
                Some(service)
            }
            None => {
                tracing::warn!("CORPUS_PATH not set; question answering disabled");
                None
            }
        };

        Ok(Self::new(
            get_page_extractor(config),
            pipeline,
            retrieval,
            config.summary_output_dir.clone(),
        ))
    }

    /// Whether a corpus index is available for answering.
    pub fn has_corpus(&self) -> bool {
        self.retrieval.is_some()
    }

    async fn run_job(&self, upload: DocumentUpload) -> Result<SummarizeOutcome, ProcessingError> {
        let DocumentUpload { file_name, bytes } = upload;
        if !self.extractor.accepts(&file_name) {
            return Err(ProcessingError::InvalidInput(format!(
                "unsupported document type: {file_name}"
            )));
        }
        if bytes.is_empty() {
            return Err(ProcessingError::InvalidInput(format!(
                "document {file_name} is empty"
            )));
        }

        let job_id = Uuid::new_v4().to_string();
        tracing::info!(job_id = %job_id, document = %file_name, bytes = bytes.len(), "Summarization job started");

        let document = MaterializedDocument::write(&bytes, self.extractor.suffix()).map_err(|err| {
            ProcessingError::Resource(format!("failed to materialize document: {err}"))
        })?;
        let pages = self.extractor.extract_pages(document.path()).await?;
        let output = self.pipeline.run(&pages).await?;
        document.release().map_err(|err| {
            ProcessingError::Resource(format!("failed to release temporary document: {err}"))
        })?;

        let summary_file = match &self.summary_dir {
            Some(dir) => {
                let record = SummaryRecord {
                    job_id: job_id.clone(),
                    document_name: file_name,
                    document_sha256: document_digest(&bytes),
                    timestamp: timestamp_now()?,
                    page_summaries: output.pages.summaries.clone(),
                    final_summary: output.reduction.final_summary.clone(),
                };
                Some(persist_summary(dir, &record).await?)
            }
            None => None,
        };

        Ok(SummarizeOutcome {
            job_id,
            final_summary: output.reduction.final_summary,
            page_summaries: output.pages.summaries,
            skipped_pages: output.pages.skipped,
            summary_file,
        })
    }
}

async fn build_retrieval(
    config: &Config,
    corpus: &str,
    embedder: Arc<dyn EmbeddingClient>,
    completion: Arc<dyn CompletionClient>,
) -> anyhow::Result<RetrievalService> {
    let settings = AnswerSettings {
        model: config.answer_model.clone(),
        temperature: config.summary_temperature,
        top_k: config.search_top_k,
    };
    RetrievalService::from_corpus(corpus, config.chunk_words, embedder, completion, settings, None)
        .await
        .context("failed to build corpus index")
}

#[async_trait]
impl ProcessingApi for ProcessingService {
    async fn summarize(&self, upload: DocumentUpload) -> Result<SummarizeOutcome, ProcessingError> {
        match self.run_job(upload).await {
            Ok(outcome) => {
                self.metrics.record_summary(
                    outcome.page_summaries.len() as u64,
                    outcome.skipped_pages.len() as u64,
                );
                tracing::info!(
                    job_id = %outcome.job_id,
                    pages = outcome.page_summaries.len(),
                    skipped = outcome.skipped_pages.len(),
                    "Summarization job finished"
                );
                Ok(outcome)
            }
            Err(error) => {
                self.metrics.record_failed_job();
                tracing::error!(error = %error, kind = ?error.kind(), "Summarization job failed");
                Err(error)
            }
        }
    }

    async fn answer(&self, question: String) -> Result<AnswerOutcome, ProcessingError> {
        let retrieval = self.retrieval.as_ref().ok_or_else(|| {
            ProcessingError::InvalidInput("no corpus is configured for question answering".into())
        })?;
        let outcome = retrieval.answer(&question).await?;
        self.metrics.record_answer();
        Ok(outcome)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
