//! Page-by-page summarization followed by the map/combine reduction.
//!
//! Pages are handled strictly one at a time in page order. Each relevant page is paced by a
//! [`DispatchController`] owned by the job, summarized, charged to the budget, and followed by
//! a fixed cool-down. Any provider failure aborts the job.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::completion::{CompletionClient, CompletionRequest};
use crate::config::Config;
use crate::extraction::ExtractedPage;

use super::prompts::page_summary_prompt;
use super::rate_limit::{BudgetSettings, DispatchController, TokenEstimator};
use super::reduce::{DEFAULT_BATCH_SIZE, HierarchicalReducer, Reduction};
use super::relevance::{DEFAULT_MIN_PAGE_WORDS, RelevanceFilter};
use super::types::ProcessingError;

/// Tunables for one summarization pipeline.
#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    /// Model used for page, map, and combine calls.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Relevance threshold in words.
    pub min_page_words: usize,
    /// Tokens added to each page estimate for the instruction and the reply.
    pub page_token_overhead: usize,
    /// Pause after each successful page call.
    pub cooldown: Duration,
    /// Page summaries per map batch.
    pub batch_size: usize,
    /// Token budget applied to page calls.
    pub budget: BudgetSettings,
}

impl SummarizerSettings {
    /// Derive settings from the service configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.summary_model.clone(),
            temperature: config.summary_temperature,
            min_page_words: config.min_page_words,
            page_token_overhead: config.page_token_overhead,
            cooldown: Duration::from_millis(config.page_cooldown_ms),
            batch_size: config.summary_batch_size,
            budget: BudgetSettings {
                tokens_per_window: config.rate_limit_tokens_per_window,
                window: Duration::from_secs(config.rate_limit_window_secs),
            },
        }
    }
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            model: "gemma2-9b-it".into(),
            temperature: 0.2,
            min_page_words: DEFAULT_MIN_PAGE_WORDS,
            page_token_overhead: 500,
            cooldown: Duration::from_millis(1500),
            batch_size: DEFAULT_BATCH_SIZE,
            budget: BudgetSettings::default(),
        }
    }
}

/// Page-level results of the first stage.
#[derive(Debug, Clone, Default)]
pub struct PageSummaries {
    /// Summaries keyed by page number.
    pub summaries: BTreeMap<u32, String>,
    /// Pages that produced no summary.
    pub skipped: Vec<u32>,
}

/// Output of a complete summarization run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Page summaries and skipped pages.
    pub pages: PageSummaries,
    /// Batches, map outputs, and the final summary.
    pub reduction: Reduction,
}

/// Sequential summarization pipeline.
pub struct SummarizationPipeline {
    client: Arc<dyn CompletionClient>,
    settings: SummarizerSettings,
    estimator: TokenEstimator,
    filter: RelevanceFilter,
    reducer: HierarchicalReducer,
}

impl SummarizationPipeline {
    /// Build a pipeline issuing every call through `client`.
    pub fn new(
        client: Arc<dyn CompletionClient>,
        settings: SummarizerSettings,
        estimator: TokenEstimator,
    ) -> Self {
        let reducer = HierarchicalReducer::new(
            client.clone(),
            settings.model.clone(),
            settings.temperature,
            settings.batch_size,
        );
        Self {
            client,
            filter: RelevanceFilter::new(settings.min_page_words),
            settings,
            estimator,
            reducer,
        }
    }

    /// Summarize every relevant page in ascending page order under a fresh token budget.
    pub async fn summarize_pages(
        &self,
        pages: &[ExtractedPage],
    ) -> Result<PageSummaries, ProcessingError> {
        let mut ordered: Vec<&ExtractedPage> = pages.iter().collect();
        ordered.sort_by_key(|page| page.number);

        let total = ordered.len();
        let mut controller = DispatchController::new(self.settings.budget);
        let mut result = PageSummaries::default();

        for page in ordered {
            let Some(raw) = page.text.as_deref() else {
                tracing::warn!(page = page.number, "Page text unavailable; skipping");
                result.skipped.push(page.number);
                continue;
            };

            let assessment = self.filter.evaluate(raw);
            if !assessment.relevant {
                tracing::info!(
                    page = page.number,
                    total,
                    min_words = self.filter.min_words(),
                    "Skipping page below relevance threshold"
                );
                result.skipped.push(page.number);
                continue;
            }

            let estimated =
                (self.estimator)(&assessment.normalized) + self.settings.page_token_overhead;
            controller.admit(estimated).await;

            tracing::info!(
                page = page.number,
                total,
                estimated,
                tokens_used = controller.tokens_used(),
                "Summarizing page"
            );
            let summary = self
                .client
                .complete(CompletionRequest {
                    model: self.settings.model.clone(),
                    prompt: page_summary_prompt(&assessment.normalized),
                    temperature: self.settings.temperature,
                })
                .await?;

            result.summaries.insert(page.number, summary);
            controller.record(estimated);
            if !self.settings.cooldown.is_zero() {
                tokio::time::sleep(self.settings.cooldown).await;
            }
        }

        Ok(result)
    }

    /// Summarize pages, then fold the page summaries into the final structured summary.
    pub async fn run(&self, pages: &[ExtractedPage]) -> Result<PipelineOutput, ProcessingError> {
        let pages = self.summarize_pages(pages).await?;
        if pages.summaries.is_empty() {
            return Err(ProcessingError::InvalidInput(
                "document contains no pages with enough text to summarize".into(),
            ));
        }

        tracing::info!(
            summarized = pages.summaries.len(),
            skipped = pages.skipped.len(),
            "Generating final summary"
        );
        let reduction = self.reducer.reduce(&pages.summaries).await?;
        Ok(PipelineOutput { pages, reduction })
    }
}
