//! Page normalization and relevance decisions.

/// Default minimum word count for a page to be summarized.
pub const DEFAULT_MIN_PAGE_WORDS: usize = 30;

/// Normalize raw page text: trim every line, drop blank lines and lines made only of numeric
/// characters in any script (page-number artifacts), and rejoin the survivors with newlines.
pub fn normalize_page_text(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_page_number(line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_page_number(line: &str) -> bool {
    line.chars().all(char::is_numeric)
}

/// Word-count threshold deciding whether a page carries enough content to summarize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelevanceFilter {
    min_words: usize,
}

impl RelevanceFilter {
    /// Create a filter requiring at least `min_words` whitespace-delimited words.
    pub const fn new(min_words: usize) -> Self {
        Self { min_words }
    }

    /// Configured threshold.
    pub const fn min_words(&self) -> usize {
        self.min_words
    }

    /// Whether already-normalized text meets the threshold. Exactly `min_words` is relevant.
    pub fn is_relevant(&self, normalized: &str) -> bool {
        normalized.split_whitespace().count() >= self.min_words
    }

    /// Normalize raw page text and decide its relevance in one step.
    pub fn evaluate(&self, raw: &str) -> PageAssessment {
        let normalized = normalize_page_text(raw);
        let relevant = self.is_relevant(&normalized);
        PageAssessment {
            normalized,
            relevant,
        }
    }
}

impl Default for RelevanceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PAGE_WORDS)
    }
}

/// Normalized page text with its relevance decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageAssessment {
    /// Text after line normalization.
    pub normalized: String,
    /// Whether the page should be summarized.
    pub relevant: bool,
}
