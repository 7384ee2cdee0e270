use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::{FeedError, UtcDateTime, ValidationError};

/// Reset cadence of an account budget. Windows align to UTC boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetWindow {
    Minute,
    Day,
}

impl BudgetWindow {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Day => "day",
        }
    }

    fn next_reset(self, now: UtcDateTime) -> UtcDateTime {
        match self {
            Self::Minute => now.next_minute_boundary(),
            Self::Day => now.next_day_boundary(),
        }
    }
}

impl Display for BudgetWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BudgetWindow {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "minute" | "min" | "m" => Ok(Self::Minute),
            "day" | "daily" | "d" => Ok(Self::Day),
            other => Err(ValidationError::InvalidConfig {
                key: String::from("budget window"),
                message: format!("expected 'minute' or 'day', got '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetConfig {
    pub limit: u32,
    pub window: BudgetWindow,
    /// Fraction of `limit` at which the snapshot reports `warning`.
    pub warning_ratio: f64,
}

impl BudgetConfig {
    pub fn new(limit: u32, window: BudgetWindow) -> Self {
        Self {
            limit,
            window,
            warning_ratio: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    Ok,
    Warning,
    Blocked,
}

/// Budget view exposed in response meta and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSnapshot {
    pub account: String,
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub state: BudgetStatus,
    pub reset_at: UtcDateTime,
    pub window: BudgetWindow,
}

#[derive(Debug)]
struct BudgetState {
    used: u32,
    reset_at: UtcDateTime,
}

/// Shared call quota for one upstream account.
///
/// Every feed billing against the same account holds the same `Arc<BudgetManager>`.
/// State is process-local.
#[derive(Debug)]
pub struct BudgetManager {
    account: String,
    config: BudgetConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<BudgetState>,
}

impl BudgetManager {
    pub fn new(account: impl Into<String>, config: BudgetConfig, clock: Arc<dyn Clock>) -> Self {
        let reset_at = config.window.next_reset(clock.now());
        Self {
            account: account.into(),
            config,
            clock,
            state: Mutex::new(BudgetState { used: 0, reset_at }),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn config(&self) -> BudgetConfig {
        self.config
    }

    /// Reserves `cost` calls. Denies without mutating when the reservation would
    /// exceed the limit.
    pub fn consume(&self, cost: u32) -> Result<(), FeedError> {
        let now = self.clock.now();
        let mut state = self.lock();
        self.roll_window(&mut state, now);

        let Some(next) = state.used.checked_add(cost).filter(|next| *next <= self.config.limit)
        else {
            warn!(
                account = %self.account,
                used = state.used,
                limit = self.config.limit,
                cost,
                "budget exhausted, denying upstream call"
            );
            return Err(FeedError::BudgetExhausted {
                account: self.account.clone(),
                used: state.used,
                limit: self.config.limit,
            });
        };

        state.used = next;
        Ok(())
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        let now = self.clock.now();
        let mut state = self.lock();
        self.roll_window(&mut state, now);

        BudgetSnapshot {
            account: self.account.clone(),
            used: state.used,
            limit: self.config.limit,
            remaining: self.config.limit.saturating_sub(state.used),
            state: self.status(state.used),
            reset_at: state.reset_at,
            window: self.config.window,
        }
    }

    fn status(&self, used: u32) -> BudgetStatus {
        if used >= self.config.limit {
            return BudgetStatus::Blocked;
        }
        let warning_at = f64::from(self.config.limit) * self.config.warning_ratio;
        if f64::from(used) >= warning_at {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Ok
        }
    }

    fn roll_window(&self, state: &mut BudgetState, now: UtcDateTime) {
        if now < state.reset_at {
            return;
        }
        if state.used > 0 {
            info!(account = %self.account, used = state.used, "budget window reset");
        }
        state.used = 0;
        state.reset_at = self.config.window.next_reset(now);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BudgetState> {
        self.state.lock().expect("budget lock is not poisoned")
    }
}
