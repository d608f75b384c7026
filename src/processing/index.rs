//! In-memory embedding index and dot-product similarity search.
//!
//! The index is built once from the corpus chunks and never mutated afterwards; share it
//! behind an `Arc` and search it concurrently without locking. Vectors are stored row-major in a
//! single contiguous buffer, row `i` belonging to chunk `i`.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::embedding::{EmbeddingClient, EmbeddingClientError};

use super::chunking::Chunk;

/// Default number of results returned by a search.
pub const DEFAULT_TOP_K: usize = 5;

/// Errors raised while building or querying the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// There was nothing to index.
    #[error("corpus contains no text to index")]
    EmptyCorpus,
    /// A vector did not match the index dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// The number of vectors differs from the number of chunks.
    #[error("expected {expected} vectors, got {actual}")]
    VectorCountMismatch {
        /// Number of chunks.
        expected: usize,
        /// Number of vectors supplied.
        actual: usize,
    },
    /// The embedding provider failed.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
}

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityResult {
    /// Index of the matching chunk.
    pub chunk_index: usize,
    /// Chunk text.
    pub text: String,
    /// Dot product of the query and chunk vectors.
    pub score: f32,
}

/// Progress of an index build, reported once per embedded chunk.
#[derive(Debug, Clone, Copy)]
pub struct ChunkProgress {
    /// 0-based index of the chunk just embedded.
    pub chunk_index: usize,
    /// Total number of chunks.
    pub total: usize,
    /// Time spent embedding this chunk.
    pub chunk_elapsed: Duration,
    /// Estimated time left, from the running average.
    pub estimated_remaining: Duration,
}

/// Observer notified while the index is built.
pub trait IndexProgress: Send + Sync {
    /// Called after each chunk is embedded.
    fn on_chunk(&self, progress: ChunkProgress);

    /// Called once the whole corpus is embedded.
    fn on_complete(&self, _total: usize, _elapsed: Duration) {}
}

/// Progress observer that writes to the tracing log.
pub struct LoggingProgress;

impl IndexProgress for LoggingProgress {
    fn on_chunk(&self, progress: ChunkProgress) {
        tracing::info!(
            chunk = progress.chunk_index + 1,
            total = progress.total,
            elapsed_ms = progress.chunk_elapsed.as_millis() as u64,
            remaining_ms = progress.estimated_remaining.as_millis() as u64,
            "Embedded chunk"
        );
    }

    fn on_complete(&self, total: usize, elapsed: Duration) {
        tracing::info!(
            chunks = total,
            elapsed_ms = elapsed.as_millis() as u64,
            "Embedding index ready"
        );
    }
}

/// Immutable chunk embeddings.
#[derive(Debug)]
pub struct EmbeddingIndex {
    chunks: Vec<Chunk>,
    vectors: Vec<f32>,
    dimension: usize,
}

impl EmbeddingIndex {
    /// Embed every chunk in order, one provider call per chunk.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingClient,
        progress: Option<&dyn IndexProgress>,
    ) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }

        let total = chunks.len();
        let started = Instant::now();
        let mut vectors = Vec::with_capacity(total);
        for (position, chunk) in chunks.iter().enumerate() {
            let chunk_started = Instant::now();
            vectors.push(embedder.embed(&chunk.text).await?);

            if let Some(observer) = progress {
                let done = position + 1;
                let average = started.elapsed() / done as u32;
                observer.on_chunk(ChunkProgress {
                    chunk_index: position,
                    total,
                    chunk_elapsed: chunk_started.elapsed(),
                    estimated_remaining: average * (total - done) as u32,
                });
            }
        }

        let index = Self::from_vectors(chunks, vectors)?;
        if let Some(observer) = progress {
            observer.on_complete(total, started.elapsed());
        }
        Ok(index)
    }

    /// Assemble an index from precomputed vectors, one per chunk.
    pub fn from_vectors(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }
        if chunks.len() != vectors.len() {
            return Err(IndexError::VectorCountMismatch {
                expected: chunks.len(),
                actual: vectors.len(),
            });
        }

        let dimension = vectors[0].len();
        if dimension == 0 {
            return Err(IndexError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }
        let mut matrix = Vec::with_capacity(dimension * vectors.len());
        for vector in vectors {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            matrix.extend_from_slice(&vector);
        }

        Ok(Self {
            chunks,
            vectors: matrix,
            dimension,
        })
    }

    /// Number of indexed chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Vector of chunk `index`, if it exists.
    pub fn vector(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.dimension)?;
        self.vectors.get(start..start + self.dimension)
    }

    /// Rank all chunks against `query` and return the best `k`.
    ///
    /// Results are ordered by descending score; equal scores keep ascending chunk order. A row
    /// whose score is not finite ranks below every finite score.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SimilarityResult>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .map(|row| {
                let score = dot(row, query);
                if score.is_finite() { score } else { f32::NEG_INFINITY }
            })
            .enumerate()
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(chunk_index, score)| SimilarityResult {
                chunk_index,
                text: self.chunks[chunk_index].text.clone(),
                score,
            })
            .collect())
    }
}

fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbeddingClient;
    use crate::processing::chunking::chunk_words;
    use std::sync::Mutex;

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk {
            index,
            text: text.into(),
            word_count: text.split_whitespace().count(),
        }
    }

    fn small_index() -> EmbeddingIndex {
        EmbeddingIndex::from_vectors(
            vec![chunk(0, "a"), chunk(1, "b"), chunk(2, "c"), chunk(3, "d")],
            vec![
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![1.0, 0.0],
                vec![0.5, 0.5],
            ],
        )
        .expect("index")
    }

    #[test]
    fn search_orders_by_score_and_breaks_ties_by_chunk_index() {
        let results = small_index().search(&[1.0, 0.0], 3).expect("search");
        let order: Vec<usize> = results.iter().map(|hit| hit.chunk_index).collect();
        assert_eq!(order, vec![0, 2, 3]);
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[2].score, 0.5);
    }

    #[test]
    fn search_with_large_k_returns_every_chunk_once() {
        let results = small_index().search(&[0.2, 0.7], 10).expect("search");
        let mut seen: Vec<usize> = results.iter().map(|hit| hit.chunk_index).collect();
        assert!(results.windows(2).all(|pair| pair[0].score >= pair[1].score));
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn non_finite_scores_rank_last() {
        let index = EmbeddingIndex::from_vectors(
            vec![chunk(0, "nan row"), chunk(1, "plain row"), chunk(2, "inf row")],
            vec![vec![f32::NAN], vec![0.5], vec![f32::INFINITY]],
        )
        .expect("index");

        let results = index.search(&[1.0], 3).expect("search");

        assert_eq!(results[0].chunk_index, 1);
        assert_eq!(results[0].score, 0.5);
        assert!(results[1..].iter().all(|hit| hit.score == f32::NEG_INFINITY));
    }

    #[test]
    fn search_with_zero_k_is_empty() {
        assert!(small_index().search(&[1.0, 0.0], 0).expect("search").is_empty());
    }

    #[test]
    fn search_rejects_wrong_query_dimension() {
        let error = small_index().search(&[1.0], 2).unwrap_err();
        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn from_vectors_rejects_ragged_rows() {
        let error = EmbeddingIndex::from_vectors(
            vec![chunk(0, "a"), chunk(1, "b")],
            vec![vec![1.0, 0.0], vec![1.0]],
        )
        .unwrap_err();
        assert!(matches!(error, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn vector_rows_align_with_chunks() {
        let index = small_index();
        assert_eq!(index.vector(1), Some(&[0.0, 1.0][..]));
        assert_eq!(index.vector(4), None);
    }

    struct CountingProgress {
        seen: Mutex<Vec<usize>>,
    }

    impl IndexProgress for CountingProgress {
        fn on_chunk(&self, progress: ChunkProgress) {
            self.seen.lock().expect("lock").push(progress.chunk_index);
        }
    }

    #[tokio::test]
    async fn build_embeds_in_chunk_order_and_reports_progress() {
        let chunks = chunk_words("alpha beta gamma delta epsilon", 2);
        let progress = CountingProgress {
            seen: Mutex::new(Vec::new()),
        };
        let index = EmbeddingIndex::build(chunks, &HashingEmbeddingClient::new(8), Some(&progress))
            .await
            .expect("index");

        assert_eq!(index.chunk_count(), 3);
        assert_eq!(index.dimension(), 8);
        assert_eq!(*progress.seen.lock().expect("lock"), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn build_rejects_empty_corpus() {
        let error = EmbeddingIndex::build(Vec::new(), &HashingEmbeddingClient::new(8), None)
            .await
            .unwrap_err();
        assert!(matches!(error, IndexError::EmptyCorpus));
    }
}
