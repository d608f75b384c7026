//! Question answering over an embedded corpus.

use std::sync::Arc;

use crate::completion::{CompletionClient, CompletionRequest};
use crate::embedding::EmbeddingClient;

use super::chunking::chunk_words;
use super::index::{EmbeddingIndex, IndexProgress, LoggingProgress, SimilarityResult};
use super::prompts::answer_prompt;
use super::types::{AnswerOutcome, ProcessingError};

/// Answer generation parameters.
#[derive(Debug, Clone)]
pub struct AnswerSettings {
    /// Model used for answers.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Chunks retrieved per question.
    pub top_k: usize,
}

/// Retrieves corpus chunks for a question and asks the completion provider to answer it.
pub struct RetrievalService {
    index: Arc<EmbeddingIndex>,
    embedder: Arc<dyn EmbeddingClient>,
    completion: Arc<dyn CompletionClient>,
    settings: AnswerSettings,
}

impl RetrievalService {
    /// Wrap an already-built index.
    pub fn new(
        index: Arc<EmbeddingIndex>,
        embedder: Arc<dyn EmbeddingClient>,
        completion: Arc<dyn CompletionClient>,
        settings: AnswerSettings,
    ) -> Self {
        Self {
            index,
            embedder,
            completion,
            settings,
        }
    }

    /// Chunk `corpus`, embed every chunk, and wrap the resulting index.
    pub async fn from_corpus(
        corpus: &str,
        chunk_size: usize,
        embedder: Arc<dyn EmbeddingClient>,
        completion: Arc<dyn CompletionClient>,
        settings: AnswerSettings,
        progress: Option<&dyn IndexProgress>,
    ) -> Result<Self, ProcessingError> {
        let chunks = chunk_words(corpus, chunk_size);
        tracing::info!(chunks = chunks.len(), chunk_size, "Building embedding index");
        let progress = progress.unwrap_or(&LoggingProgress);
        let index = EmbeddingIndex::build(chunks, embedder.as_ref(), Some(progress)).await?;
        tracing::debug!(
            chunks = index.chunk_count(),
            dimension = index.dimension(),
            "Corpus index built"
        );
        Ok(Self::new(Arc::new(index), embedder, completion, settings))
    }

    /// Embed `query` and return the `k` most similar chunks.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<SimilarityResult>, ProcessingError> {
        let vector = self.embedder.embed(query).await?;
        Ok(self.index.search(&vector, k)?)
    }

    /// Answer `question` from the configured number of retrieved chunks.
    pub async fn answer(&self, question: &str) -> Result<AnswerOutcome, ProcessingError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ProcessingError::InvalidInput(
                "question must not be empty".into(),
            ));
        }

        let evidence = self.search(question, self.settings.top_k).await?;
        tracing::debug!(
            hits = evidence.len(),
            best = evidence.first().map(|hit| hit.score),
            "Retrieved evidence"
        );

        let answer = self
            .completion
            .complete(CompletionRequest {
                model: self.settings.model.clone(),
                prompt: answer_prompt(question, &evidence),
                temperature: self.settings.temperature,
            })
            .await?;

        Ok(AnswerOutcome {
            question: question.to_string(),
            answer,
            evidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionClientError;
    use crate::embedding::EmbeddingClientError;
    use crate::processing::chunking::Chunk;
    use crate::processing::types::ErrorKind;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingClient for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
            let has = |word: &str| if text.contains(word) { 1.0 } else { 0.0 };
            Ok(vec![has("budget"), has("deadline")])
        }
    }

    struct EchoCompletion {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionClient for EchoCompletion {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<String, CompletionClientError> {
            self.prompts.lock().await.push(request.prompt);
            Ok("The budget is fixed.".into())
        }
    }

    struct FailingCompletion;

    #[async_trait]
    impl CompletionClient for FailingCompletion {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<String, CompletionClientError> {
            Err(CompletionClientError::GenerationFailed(
                "provider returned 500".into(),
            ))
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingClient for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
            Err(EmbeddingClientError::ProviderUnavailable(
                "connection refused".into(),
            ))
        }
    }

    fn settings() -> AnswerSettings {
        AnswerSettings {
            model: "llama-3.1-8b-instant".into(),
            temperature: 0.2,
            top_k: 2,
        }
    }

    fn index() -> Arc<EmbeddingIndex> {
        let chunks = ["the deadline is june", "the budget is ten", "misc text"]
            .iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                index,
                text: (*text).into(),
                word_count: text.split_whitespace().count(),
            })
            .collect();
        Arc::new(
            EmbeddingIndex::from_vectors(
                chunks,
                vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 0.0]],
            )
            .expect("index"),
        )
    }

    fn service(completion: Arc<EchoCompletion>) -> RetrievalService {
        RetrievalService::new(index(), Arc::new(KeywordEmbedder), completion, settings())
    }

    #[tokio::test]
    async fn answer_uses_best_chunks_in_prompt() {
        let completion = Arc::new(EchoCompletion {
            prompts: Mutex::new(Vec::new()),
        });
        let outcome = service(completion.clone())
            .answer("  What is the budget?  ")
            .await
            .expect("answer");

        assert_eq!(outcome.question, "What is the budget?");
        assert_eq!(outcome.answer, "The budget is fixed.");
        assert_eq!(outcome.evidence.len(), 2);
        assert_eq!(outcome.evidence[0].chunk_index, 1);

        let prompts = completion.prompts.lock().await;
        assert!(prompts[0].contains("Chunk 1 (Similarity: 1.0000):\nthe budget is ten"));
    }

    #[tokio::test]
    async fn blank_question_is_rejected_without_calls() {
        let completion = Arc::new(EchoCompletion {
            prompts: Mutex::new(Vec::new()),
        });
        let error = service(completion.clone()).answer("   ").await.unwrap_err();

        assert!(matches!(error, ProcessingError::InvalidInput(_)));
        assert!(completion.prompts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn from_corpus_rejects_empty_text() {
        let completion = Arc::new(EchoCompletion {
            prompts: Mutex::new(Vec::new()),
        });
        let result = RetrievalService::from_corpus(
            " ",
            300,
            Arc::new(KeywordEmbedder),
            completion,
            AnswerSettings {
                model: "m".into(),
                temperature: 0.0,
                top_k: 5,
            },
            None,
        )
        .await;

        assert!(matches!(
            result,
            Err(ProcessingError::Index(crate::processing::index::IndexError::EmptyCorpus))
        ));
    }

    #[tokio::test]
    async fn generation_failure_is_an_upstream_error() {
        let service = RetrievalService::new(
            index(),
            Arc::new(KeywordEmbedder),
            Arc::new(FailingCompletion),
            settings(),
        );

        let error = service.answer("What is the budget?").await.unwrap_err();

        assert!(matches!(error, ProcessingError::Completion(_)));
        assert_eq!(error.kind(), ErrorKind::UpstreamService);
    }

    #[tokio::test]
    async fn embedding_failure_is_an_upstream_error_and_skips_generation() {
        let completion = Arc::new(EchoCompletion {
            prompts: Mutex::new(Vec::new()),
        });
        let service = RetrievalService::new(
            index(),
            Arc::new(FailingEmbedder),
            completion.clone(),
            settings(),
        );

        let error = service.answer("What is the budget?").await.unwrap_err();

        assert!(matches!(error, ProcessingError::Embedding(_)));
        assert_eq!(error.kind(), ErrorKind::UpstreamService);
        assert!(completion.prompts.lock().await.is_empty());
    }
}
