use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::{ProviderId, UtcDateTime};

/// Runtime circuit state for one provider connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(300),
        }
    }
}

/// Point-in-time view for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub provider: ProviderId,
    pub state: CircuitState,
    pub failure_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<UtcDateTime>,
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    failure_count: u32,
    next_retry_at: Option<UtcDateTime>,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            next_retry_at: None,
        }
    }
}

/// Thread-safe circuit breaker guarding one upstream provider.
///
/// Transitions: Closed → Open (threshold reached) → HalfOpen (reset timeout elapsed,
/// one trial granted) → Closed on success or Open on failure.
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: ProviderId,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(provider: ProviderId, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider,
            config,
            clock,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    /// Returns whether an upstream call may be made now. In Open state the first
    /// call after `next_retry_at` flips the breaker to HalfOpen and receives the
    /// single trial; everyone else is refused until that trial settles.
    pub fn can_attempt(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => false,
            CircuitState::Open => {
                let trial_due = inner
                    .next_retry_at
                    .map(|next_retry_at| now >= next_retry_at)
                    .unwrap_or(true);

                if trial_due {
                    inner.state = CircuitState::HalfOpen;
                    info!(provider = %self.provider, "circuit half-open, allowing one trial call");
                }
                trial_due
            }
        }
    }

    /// Gives back an unused HalfOpen trial so the next caller may take it.
    pub fn release_trial(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Open;
            inner.next_retry_at = Some(now);
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!(provider = %self.provider, "circuit closed after successful call");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.next_retry_at = None;
    }

    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);

        let should_open = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.failure_count >= self.config.failure_threshold,
            CircuitState::Open => false,
        };

        if should_open {
            let next_retry_at = now.saturating_add(self.config.reset_timeout);
            inner.state = CircuitState::Open;
            inner.next_retry_at = Some(next_retry_at);
            warn!(
                provider = %self.provider,
                failures = inner.failure_count,
                next_retry_at = %next_retry_at,
                "circuit opened"
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            provider: self.provider.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            next_retry_at: inner.next_retry_at,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CircuitInner> {
        self.inner
            .lock()
            .expect("circuit breaker lock is not poisoned")
    }
}
