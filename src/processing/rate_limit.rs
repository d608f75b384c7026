//! Client-side token budget for the completion provider.
//!
//! [`DispatchController`] tracks a fixed window of tokens and suspends the caller when the next
//! call would overflow the ceiling. It takes `&mut self`, so one controller serves exactly one
//! sequential stream of calls; each summarization job constructs its own.
//!
//! Time comes from `tokio::time`, which lets tests drive the window with a paused clock.

use anyhow::Error as TokenizerError;
use std::sync::Arc;
use std::time::Duration;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, r50k_base};
use tokio::time::Instant;

/// Estimates how many provider tokens a piece of text costs.
pub type TokenEstimator = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Default tokens admitted per window.
pub const DEFAULT_TOKENS_PER_WINDOW: usize = 30_000;
/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Ceiling and window length enforced by a [`DispatchController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetSettings {
    /// Maximum tokens recorded within one window.
    pub tokens_per_window: usize,
    /// Window length.
    pub window: Duration,
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            tokens_per_window: DEFAULT_TOKENS_PER_WINDOW,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Outcome of [`DispatchController::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First call of the job; the window starts now.
    Opened,
    /// The call fits in the current window.
    Immediate,
    /// The window was reset, after suspending the caller for `waited`.
    Reset {
        /// Time spent waiting for the window to expire (zero when it already had).
        waited: Duration,
    },
}

/// Rolling token budget for one job.
#[derive(Debug)]
pub struct DispatchController {
    settings: BudgetSettings,
    window_start: Option<Instant>,
    tokens_used: usize,
}

impl DispatchController {
    /// Create a controller with an unopened window.
    pub fn new(settings: BudgetSettings) -> Self {
        Self {
            settings,
            window_start: None,
            tokens_used: 0,
        }
    }

    /// Tokens recorded in the current window.
    pub fn tokens_used(&self) -> usize {
        self.tokens_used
    }

    /// Wait until a call estimated at `estimated_tokens` may proceed.
    ///
    /// The first call always proceeds and opens the window. A call that would push the window
    /// over its ceiling waits for the remainder of the window (if any) and then resets it.
    pub async fn admit(&mut self, estimated_tokens: usize) -> Admission {
        let Some(window_start) = self.window_start else {
            self.window_start = Some(Instant::now());
            return Admission::Opened;
        };

        let projected = self.tokens_used.saturating_add(estimated_tokens);
        if projected <= self.settings.tokens_per_window {
            return Admission::Immediate;
        }

        let elapsed = window_start.elapsed();
        let waited = if elapsed < self.settings.window {
            let remaining = self.settings.window - elapsed;
            tracing::info!(
                wait_ms = remaining.as_millis() as u64,
                tokens_used = self.tokens_used,
                estimated_tokens,
                ceiling = self.settings.tokens_per_window,
                "Token budget exhausted; waiting for window reset"
            );
            tokio::time::sleep(remaining).await;
            remaining
        } else {
            Duration::ZERO
        };

        if estimated_tokens > self.settings.tokens_per_window {
            tracing::warn!(
                estimated_tokens,
                ceiling = self.settings.tokens_per_window,
                "Single call exceeds the per-window ceiling"
            );
        }

        self.reset();
        Admission::Reset { waited }
    }

    /// Charge `tokens` to the current window after a successful call.
    pub fn record(&mut self, tokens: usize) {
        self.tokens_used = self.tokens_used.saturating_add(tokens);
    }

    fn reset(&mut self) {
        self.window_start = Some(Instant::now());
        self.tokens_used = 0;
    }
}

/// Estimate tokens as characters / 4, never less than one.
pub fn char_estimator() -> TokenEstimator {
    Arc::new(|text: &str| (text.chars().count() / 4).max(1))
}

/// Build an estimator from its configured name.
///
/// `chars` selects [`char_estimator`]; anything else is resolved as a tiktoken model or
/// encoding name.
pub fn build_token_estimator(name: &str) -> Result<TokenEstimator, TokenizerError> {
    let normalized = name.trim();
    if normalized.is_empty() || normalized.eq_ignore_ascii_case("chars") {
        return Ok(char_estimator());
    }
    let encoding = Arc::new(resolve_encoding(normalized)?);
    Ok(Arc::new(move |text: &str| {
        encoding.encode_ordinary(text).len().max(1)
    }))
}

fn resolve_encoding(name: &str) -> Result<CoreBPE, TokenizerError> {
    match name {
        "cl100k_base" => cl100k_base(),
        "o200k_base" => o200k_base(),
        "p50k_base" => p50k_base(),
        "r50k_base" | "gpt2" => r50k_base(),
        model => get_bpe_from_model(model),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(ceiling: usize) -> BudgetSettings {
        BudgetSettings {
            tokens_per_window: ceiling,
            window: Duration::from_secs(60),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_opens_window_without_waiting() {
        let mut controller = DispatchController::new(settings(1000));
        let started = Instant::now();
        assert_eq!(controller.admit(5000).await, Admission::Opened);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn calls_within_budget_are_immediate() {
        let mut controller = DispatchController::new(settings(1000));
        controller.admit(400).await;
        controller.record(400);
        assert_eq!(controller.admit(600).await, Admission::Immediate);
        controller.record(600);
        assert_eq!(controller.tokens_used(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_waits_for_remaining_window_then_resets() {
        let mut controller = DispatchController::new(settings(1000));
        controller.admit(900).await;
        controller.record(900);
        tokio::time::advance(Duration::from_secs(15)).await;

        let started = Instant::now();
        let admission = controller.admit(900).await;

        assert_eq!(
            admission,
            Admission::Reset {
                waited: Duration::from_secs(45)
            }
        );
        assert_eq!(started.elapsed(), Duration::from_secs(45));
        assert_eq!(controller.tokens_used(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_window_resets_without_waiting() {
        let mut controller = DispatchController::new(settings(1000));
        controller.admit(900).await;
        controller.record(900);
        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(
            controller.admit(900).await,
            Admission::Reset {
                waited: Duration::ZERO
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn recorded_tokens_never_exceed_ceiling_within_a_window() {
        let ceiling = 1000;
        let mut controller = DispatchController::new(settings(ceiling));
        let mut waits = 0;

        for _ in 0..6 {
            if let Admission::Reset { waited } = controller.admit(999).await {
                if waited > Duration::ZERO {
                    waits += 1;
                }
            }
            controller.record(999);
            assert!(controller.tokens_used() <= ceiling);
        }

        assert_eq!(waits, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_calls_are_not_charged() {
        let mut controller = DispatchController::new(settings(1000));
        controller.admit(800).await;
        // no record: the call failed
        assert_eq!(controller.admit(800).await, Admission::Immediate);
    }

    #[test]
    fn char_estimator_divides_by_four_with_floor_of_one() {
        let estimate = char_estimator();
        assert_eq!(estimate(""), 1);
        assert_eq!(estimate("abc"), 1);
        assert_eq!(estimate(&"x".repeat(400)), 100);
    }

    #[test]
    fn named_estimators_resolve() {
        let chars = build_token_estimator("chars").expect("chars");
        assert_eq!(chars(&"y".repeat(8)), 2);

        let tiktoken = build_token_estimator("cl100k_base").expect("tiktoken");
        assert!(tiktoken("The quick brown fox") >= 4);
    }
}
