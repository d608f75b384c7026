use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing summarization and answering activity.
#[derive(Default)]
pub struct ServiceMetrics {
    documents_summarized: AtomicU64,
    jobs_failed: AtomicU64,
    pages_summarized: AtomicU64,
    pages_skipped: AtomicU64,
    questions_answered: AtomicU64,
}

impl ServiceMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed summarization job.
    pub fn record_summary(&self, pages_summarized: u64, pages_skipped: u64) {
        self.documents_summarized.fetch_add(1, Ordering::Relaxed);
        self.pages_summarized
            .fetch_add(pages_summarized, Ordering::Relaxed);
        self.pages_skipped.fetch_add(pages_skipped, Ordering::Relaxed);
    }

    /// Record a summarization job that aborted.
    pub fn record_failed_job(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully answered question.
    pub fn record_answer(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_summarized: self.documents_summarized.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            pages_summarized: self.pages_summarized.load(Ordering::Relaxed),
            pages_skipped: self.pages_skipped.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of service counters used for reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents summarized successfully since startup.
    pub documents_summarized: u64,
    /// Summarization jobs that aborted with an error.
    pub jobs_failed: u64,
    /// Pages that produced a page summary.
    pub pages_summarized: u64,
    /// Pages skipped by the relevance filter or failed extraction.
    pub pages_skipped: u64,
    /// Questions answered against the corpus.
    pub questions_answered: u64,
}
