//! Map/combine folding of page summaries into one structured summary.
//!
//! Page summaries are grouped by ascending page number into fixed-size batches. Each batch is
//! condensed by one map call, then all map outputs are folded by a single combine call. Both
//! stages run sequentially and outside the page-level [`super::rate_limit::DispatchController`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::completion::{CompletionClient, CompletionClientError, CompletionRequest};

use super::prompts::{combine_prompt, map_prompt};

/// Default number of page summaries per batch.
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Consecutive page summaries condensed by one map call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// `(page number, summary)` pairs in ascending page order.
    pub entries: Vec<(u32, String)>,
}

impl Batch {
    /// Page numbers covered by this batch.
    pub fn page_numbers(&self) -> Vec<u32> {
        self.entries.iter().map(|(page, _)| *page).collect()
    }

    /// Render the batch as one text block, each summary prefixed by its page number.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(page, summary)| format!("Page {page}:\n{summary}"))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Group summaries into batches of at most `batch_size`, ordered by page number.
///
/// The map key decides the order, not insertion order. A `batch_size` of zero is treated as one.
pub fn group_into_batches(summaries: &BTreeMap<u32, String>, batch_size: usize) -> Vec<Batch> {
    let batch_size = batch_size.max(1);
    let entries: Vec<(u32, String)> = summaries
        .iter()
        .map(|(page, summary)| (*page, summary.clone()))
        .collect();
    entries
        .chunks(batch_size)
        .map(|group| Batch {
            entries: group.to_vec(),
        })
        .collect()
}

/// Everything produced while folding page summaries.
#[derive(Debug, Clone)]
pub struct Reduction {
    /// Batches in page order.
    pub batches: Vec<Batch>,
    /// One map output per batch, same order.
    pub map_outputs: Vec<String>,
    /// Final structured summary.
    pub final_summary: String,
}

/// Runs the map and combine stages against a completion provider.
pub struct HierarchicalReducer {
    client: Arc<dyn CompletionClient>,
    model: String,
    temperature: f32,
    batch_size: usize,
}

impl HierarchicalReducer {
    /// Create a reducer issuing calls to `model` with batches of `batch_size`.
    pub fn new(
        client: Arc<dyn CompletionClient>,
        model: impl Into<String>,
        temperature: f32,
        batch_size: usize,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
            batch_size: batch_size.max(1),
        }
    }

    /// Condense each batch with one map call, preserving batch order.
    pub async fn map(&self, batches: &[Batch]) -> Result<Vec<String>, CompletionClientError> {
        let mut outputs = Vec::with_capacity(batches.len());
        for (position, batch) in batches.iter().enumerate() {
            tracing::debug!(
                batch = position + 1,
                total = batches.len(),
                pages = ?batch.page_numbers(),
                "Mapping page batch"
            );
            let output = self.call(map_prompt(&batch.render())).await?;
            outputs.push(output);
        }
        Ok(outputs)
    }

    /// Fold all map outputs into the final structured summary with one combine call.
    pub async fn combine(&self, map_outputs: &[String]) -> Result<String, CompletionClientError> {
        tracing::debug!(parts = map_outputs.len(), "Combining map outputs");
        self.call(combine_prompt(map_outputs)).await
    }

    /// Batch, map, and combine `summaries`.
    pub async fn reduce(
        &self,
        summaries: &BTreeMap<u32, String>,
    ) -> Result<Reduction, CompletionClientError> {
        let batches = group_into_batches(summaries, self.batch_size);
        let map_outputs = self.map(&batches).await?;
        let final_summary = self.combine(&map_outputs).await?;
        Ok(Reduction {
            batches,
            map_outputs,
            final_summary,
        })
    }

    async fn call(&self, prompt: String) -> Result<String, CompletionClientError> {
        self.client
            .complete(CompletionRequest {
                model: self.model.clone(),
                prompt,
                temperature: self.temperature,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct RecordingClient {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionClient for RecordingClient {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<String, CompletionClientError> {
            let mut prompts = self.prompts.lock().await;
            prompts.push(request.prompt);
            Ok(format!("output-{}", prompts.len()))
        }
    }

    fn summaries(pages: &[u32]) -> BTreeMap<u32, String> {
        pages
            .iter()
            .map(|page| (*page, format!("summary {page}")))
            .collect()
    }

    #[test]
    fn batches_follow_page_order_with_short_tail() {
        let mut map = BTreeMap::new();
        for page in [9, 2, 7, 1, 4, 3, 8] {
            map.insert(page, format!("s{page}"));
        }
        let batches = group_into_batches(&map, 3);
        let pages: Vec<Vec<u32>> = batches.iter().map(Batch::page_numbers).collect();
        assert_eq!(pages, vec![vec![1, 2, 3], vec![4, 7, 8], vec![9]]);
    }

    #[test]
    fn batch_render_prefixes_page_numbers() {
        let batches = group_into_batches(&summaries(&[1, 3]), 3);
        assert_eq!(batches[0].render(), "Page 1:\nsummary 1\n\nPage 3:\nsummary 3");
    }

    #[test]
    fn empty_summaries_produce_no_batches() {
        assert!(group_into_batches(&BTreeMap::new(), 3).is_empty());
    }

    #[tokio::test]
    async fn reduce_issues_one_map_call_per_batch_then_one_combine() {
        let client = Arc::new(RecordingClient {
            prompts: Mutex::new(Vec::new()),
        });
        let reducer = HierarchicalReducer::new(client.clone(), "model", 0.2, 3);

        let reduction = reducer
            .reduce(&summaries(&[1, 2, 3, 4, 5, 6, 7]))
            .await
            .expect("reduction");

        let sizes: Vec<usize> = reduction.batches.iter().map(|b| b.entries.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(reduction.map_outputs, vec!["output-1", "output-2", "output-3"]);
        assert_eq!(reduction.final_summary, "output-4");

        let prompts = client.prompts.lock().await;
        assert_eq!(prompts.len(), 4);
        assert!(prompts[2].contains("Page 7:\nsummary 7"));
        assert!(prompts[3].contains("output-1\n\noutput-2\n\noutput-3"));
    }
}
