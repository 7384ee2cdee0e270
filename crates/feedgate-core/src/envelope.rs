use serde::{Deserialize, Serialize};

use crate::budget::{BudgetSnapshot, BudgetStatus};
use crate::{FeedKind, UtcDateTime};

/// How the payload in an envelope was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServeMode {
    /// Fetched from the upstream during this request.
    Live,
    /// Served from the in-memory cache (possibly stale).
    Cached,
    /// Restored from the snapshot, or an explicitly empty payload.
    Fallback,
}

/// Why a response is not live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    CircuitOpen,
    BudgetExhausted,
    UpstreamFailed,
    /// Nothing cached, no snapshot: the payload is intentionally empty.
    NoData,
}

/// Budget subset published to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetMeta {
    pub state: BudgetStatus,
    pub used: u32,
    pub limit: u32,
}

impl From<&BudgetSnapshot> for BudgetMeta {
    fn from(snapshot: &BudgetSnapshot) -> Self {
        Self {
            state: snapshot.state,
            used: snapshot.used,
            limit: snapshot.limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMeta {
    pub mode: ServeMode,
    pub source_provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetMeta>,
    pub request_id: String,
    pub build_id: String,
    pub generated_at: UtcDateTime,
    pub feed: FeedKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DegradeReason>,
}

/// The only output contract of a feed handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedResponseEnvelope<T> {
    pub meta: EnvelopeMeta,
    pub data: T,
}

impl<T> FeedResponseEnvelope<T> {
    pub fn new(meta: EnvelopeMeta, data: T) -> Self {
        Self { meta, data }
    }

    pub fn is_live(&self) -> bool {
        self.meta.mode == ServeMode::Live
    }
}
