//! Bounded fixed-delay retry policy for upstream fetches.

use std::time::Duration;

use crate::FeedError;

/// Fixed retry policy. Total attempts = `max_retries + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(1, Duration::from_secs(2))
    }
}

impl RetryPolicy {
    pub const fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Disable retries.
    pub const fn none() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    /// Whether attempt number `attempt` (0-based) that failed with `error` may be
    /// followed by another one.
    pub fn should_retry(&self, attempt: u32, error: &FeedError) -> bool {
        attempt < self.max_retries && error.retryable()
    }
}
