//! Fixed-size word chunking for the retrieval corpus.
//!
//! The corpus is split on whitespace and cut into consecutive, non-overlapping runs of
//! `max_words` words; the last chunk holds the remainder. Chunk boundaries therefore depend
//! only on the word sequence, which keeps indexing reproducible across restarts.

/// Default number of words per chunk.
pub const DEFAULT_CHUNK_WORDS: usize = 300;

/// Contiguous slice of the corpus word sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based position in the corpus.
    pub index: usize,
    /// Chunk words joined by single spaces.
    pub text: String,
    /// Number of words in the chunk.
    pub word_count: usize,
}

/// Split `text` into chunks of at most `max_words` words.
///
/// Returns an empty vector for blank input. A `max_words` of zero is treated as one.
pub fn chunk_words(text: &str, max_words: usize) -> Vec<Chunk> {
    let max_words = max_words.max(1);
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(max_words)
        .enumerate()
        .map(|(index, slice)| Chunk {
            index,
            text: slice.join(" "),
            word_count: slice.len(),
        })
        .collect()
}
