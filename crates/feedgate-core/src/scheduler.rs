//! # Refresh Scheduling
//!
//! | Plan | Trigger | Upstream key |
//! |------|---------|--------------|
//! | [`SchedulePlan::ClockAligned`] | fixed minute-of-hour offsets | whole feed |
//! | [`SchedulePlan::Batched`] | offsets, one batch per hour | `hour_index % batch_count` |
//! | [`SchedulePlan::Rolling`] | fixed interval | next symbol from [`RollingQueue`] |
//!
//! Every computation takes `now` explicitly so the same plan drives the real
//! background loop and tests running on a manual clock.

use std::collections::VecDeque;
use std::time::Duration;

use crate::{FeedKind, UtcDateTime, ValidationError};

const MILLIS_PER_MINUTE: u64 = 60_000;
const MILLIS_PER_HOUR: u64 = 3_600_000;

/// Sorted, de-duplicated minute-of-hour offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinuteOffsets(Vec<u32>);

impl MinuteOffsets {
    pub fn new(offsets: impl IntoIterator<Item = u32>) -> Result<Self, ValidationError> {
        let mut offsets: Vec<u32> = offsets.into_iter().collect();
        if let Some(value) = offsets.iter().copied().find(|offset| *offset >= 60) {
            return Err(ValidationError::InvalidOffset { value });
        }
        offsets.sort_unstable();
        offsets.dedup();
        if offsets.is_empty() {
            return Err(ValidationError::EmptySchedule);
        }
        Ok(Self(offsets))
    }

    /// Default slots: FX :00/:30, indices :05/:35, weather and commodities
    /// :10/:40, crypto :20/:50.
    pub fn for_kind(kind: FeedKind) -> Self {
        let offsets = match kind {
            FeedKind::Fx => vec![0, 30],
            FeedKind::Indices => vec![5, 35],
            FeedKind::Weather | FeedKind::Commodities => vec![10, 40],
            FeedKind::Crypto => vec![20, 50],
        };
        Self(offsets)
    }

    /// Parses a comma separated list such as `"0,30"`.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let offsets = input
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| ValidationError::InvalidConfig {
                        key: String::from("offsets"),
                        message: format!("'{part}' is not a minute offset"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(offsets)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    fn millis_until_next(&self, now: UtcDateTime) -> u64 {
        let into_hour = now.millis_into_hour();
        self.0
            .iter()
            .map(|offset| u64::from(*offset) * MILLIS_PER_MINUTE)
            .find(|slot| *slot > into_hour)
            .map(|slot| slot - into_hour)
            .unwrap_or_else(|| {
                let first = u64::from(self.0[0]) * MILLIS_PER_MINUTE;
                first + MILLIS_PER_HOUR - into_hour
            })
    }
}

/// How a feed decides when to call its upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulePlan {
    ClockAligned {
        offsets: MinuteOffsets,
    },
    Batched {
        offsets: MinuteOffsets,
        batch_count: usize,
        startup_delay: Duration,
    },
    Rolling {
        interval: Duration,
    },
}

impl SchedulePlan {
    pub fn clock_aligned(kind: FeedKind) -> Self {
        Self::ClockAligned {
            offsets: MinuteOffsets::for_kind(kind),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Batched { batch_count: 0, .. } => Err(ValidationError::InvalidBatchCount),
            Self::Rolling { interval } if interval.is_zero() => {
                Err(ValidationError::InvalidConfig {
                    key: String::from("rolling interval"),
                    message: String::from("must be greater than zero"),
                })
            }
            _ => Ok(()),
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::ClockAligned { .. } => "clock_aligned",
            Self::Batched { .. } => "batched",
            Self::Rolling { .. } => "rolling",
        }
    }
}

/// Pure slot arithmetic for one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedScheduler {
    plan: SchedulePlan,
}

impl FeedScheduler {
    pub fn new(plan: SchedulePlan) -> Result<Self, ValidationError> {
        plan.validate()?;
        Ok(Self { plan })
    }

    pub fn plan(&self) -> &SchedulePlan {
        &self.plan
    }

    /// Milliseconds from `now` to the next slot strictly after `now`. Rolling plans
    /// always wait one full interval.
    pub fn ms_until_next_slot(&self, now: UtcDateTime) -> u64 {
        match &self.plan {
            SchedulePlan::ClockAligned { offsets } | SchedulePlan::Batched { offsets, .. } => {
                offsets.millis_until_next(now)
            }
            SchedulePlan::Rolling { interval } => {
                u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)
            }
        }
    }

    pub fn next_slot_after(&self, now: UtcDateTime) -> UtcDateTime {
        now.saturating_add(Duration::from_millis(self.ms_until_next_slot(now)))
    }

    /// True once the first slot after `fetched_at` has passed.
    pub fn is_refresh_due(&self, fetched_at: UtcDateTime, now: UtcDateTime) -> bool {
        now >= self.next_slot_after(fetched_at)
    }
}

/// Contiguous split of a symbol catalog into hourly batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRotation {
    batches: Vec<Vec<String>>,
    startup_delay: Duration,
}

impl BatchRotation {
    /// Splits `catalog` into at most `batch_count` contiguous, non-empty batches.
    pub fn new(
        catalog: &[String],
        batch_count: usize,
        startup_delay: Duration,
    ) -> Result<Self, ValidationError> {
        if batch_count == 0 {
            return Err(ValidationError::InvalidBatchCount);
        }
        let size = catalog.len().div_ceil(batch_count).max(1);
        let batches = catalog.chunks(size).map(<[String]>::to_vec).collect();
        Ok(Self {
            batches,
            startup_delay,
        })
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn batch(&self, index: usize) -> Option<&[String]> {
        self.batches.get(index).map(Vec::as_slice)
    }

    pub fn current_batch(&self, hour_index: u64) -> usize {
        if self.batches.is_empty() {
            return 0;
        }
        (hour_index % self.batches.len() as u64) as usize
    }

    /// Startup offset for batch `index`: batch 0 immediately, batch *i* after
    /// `i × startup_delay`.
    pub fn startup_delay_for(&self, index: usize) -> Duration {
        self.startup_delay
            .saturating_mul(u32::try_from(index).unwrap_or(u32::MAX))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingItem {
    pub symbol: String,
    /// Lower values are fetched first.
    pub priority: u32,
}

/// Priority-ordered symbol queue, rebuilt from the full catalog every cycle.
#[derive(Debug, Clone)]
pub struct RollingQueue {
    catalog: Vec<RollingItem>,
    pending: VecDeque<String>,
    cycles: u64,
}

impl RollingQueue {
    pub fn new(mut catalog: Vec<RollingItem>) -> Self {
        catalog.sort_by_key(|item| item.priority);
        Self {
            catalog,
            pending: VecDeque::new(),
            cycles: 0,
        }
    }

    /// Catalog in list order, highest priority first.
    pub fn from_symbols(symbols: &[String]) -> Self {
        Self::new(
            symbols
                .iter()
                .enumerate()
                .map(|(index, symbol)| RollingItem {
                    symbol: symbol.clone(),
                    priority: u32::try_from(index).unwrap_or(u32::MAX),
                })
                .collect(),
        )
    }

    pub fn next_symbol(&mut self) -> Option<String> {
        self.refill();
        self.pending.pop_front()
    }

    /// Symbol that `next_symbol` would return, left on the queue.
    pub fn peek_symbol(&mut self) -> Option<String> {
        self.refill();
        self.pending.front().cloned()
    }

    /// Takes `symbol` off the queue if it is still at the front.
    pub fn commit(&mut self, symbol: &str) -> bool {
        if self.pending.front().is_some_and(|next| next == symbol) {
            self.pending.pop_front();
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        if self.pending.is_empty() && !self.catalog.is_empty() {
            self.pending = self.catalog.iter().map(|item| item.symbol.clone()).collect();
            self.cycles = self.cycles.saturating_add(1);
        }
    }

    /// Completed or started cycles so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn remaining_in_cycle(&self) -> usize {
        self.pending.len()
    }
}
