use std::fmt::{Display, Formatter};

use thiserror::Error;

/// Validation and contract errors exposed by `feedgate-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("field '{field}' cannot be empty")]
    EmptyIdentifier { field: &'static str },
    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be greater than zero")]
    NonPositiveValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("field '{field}' is outside the plausible range {range}")]
    OutOfRange { field: &'static str, range: &'static str },

    #[error("payload contains no quotes")]
    EmptyPayload,
    #[error("malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("invalid feed '{value}', expected one of fx, crypto, commodities, indices, weather")]
    InvalidFeed { value: String },
    #[error("provider id must be lowercase ascii letters, digits or '-': '{value}'")]
    InvalidProvider { value: String },

    #[error("minute offset {value} must be within 0..60")]
    InvalidOffset { value: u32 },
    #[error("schedule must contain at least one minute offset")]
    EmptySchedule,
    #[error("batch count must be greater than zero")]
    InvalidBatchCount,

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("invalid value for {key}: {message}")]
    InvalidConfig { key: String, message: String },
}

/// Upstream and orchestration failures raised while refreshing a feed.
///
/// None of these variants ever reaches the response boundary: the feed handler
/// turns each of them into a degraded (`cached` / `fallback`) response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("{provider} upstream failed{}: {message}", status_suffix(.status))]
    UpstreamHttp {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("{provider} upstream timed out after {timeout_ms}ms")]
    UpstreamTimeout { provider: String, timeout_ms: u64 },

    #[error("{provider} returned an invalid payload: {source}")]
    Validation {
        provider: String,
        #[source]
        source: ValidationError,
    },

    #[error("budget for account '{account}' exhausted ({used}/{limit})")]
    BudgetExhausted { account: String, used: u32, limit: u32 },

    #[error("circuit for {provider} is open")]
    CircuitOpen { provider: String },

    #[error("snapshot io error: {message}")]
    SnapshotIo { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl FeedError {
    pub fn http(provider: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::UpstreamHttp {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::UpstreamHttp { .. } => "upstream.http",
            Self::UpstreamTimeout { .. } => "upstream.timeout",
            Self::Validation { .. } => "upstream.validation",
            Self::BudgetExhausted { .. } => "budget.exhausted",
            Self::CircuitOpen { .. } => "circuit.open",
            Self::SnapshotIo { .. } => "snapshot.io",
            Self::Internal { .. } => "internal",
        }
    }

    /// Whether a fixed-delay retry may help. Transport failures, timeouts, HTTP 429 and
    /// 5xx qualify; everything else waits for the next scheduled slot.
    pub fn retryable(&self) -> bool {
        match self {
            Self::UpstreamTimeout { .. } => true,
            Self::UpstreamHttp { status: None, .. } => true,
            Self::UpstreamHttp {
                status: Some(status),
                ..
            } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Advisory errors degrade the response without counting as upstream failures.
    pub const fn is_advisory(&self) -> bool {
        matches!(self, Self::BudgetExhausted { .. } | Self::CircuitOpen { .. })
    }
}

fn status_suffix(status: &Option<u16>) -> StatusSuffix {
    StatusSuffix(*status)
}

struct StatusSuffix(Option<u16>);

impl Display for StatusSuffix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(status) => write!(f, " with status {status}"),
            None => Ok(()),
        }
    }
}

/// Top-level error type for configuration and tooling operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_covers_timeouts_throttling_and_server_errors() {
        assert!(FeedError::UpstreamTimeout {
            provider: String::from("twelvedata"),
            timeout_ms: 10,
        }
        .retryable());
        assert!(FeedError::http("twelvedata", Some(429), "slow down").retryable());
        assert!(FeedError::http("twelvedata", Some(503), "unavailable").retryable());
        assert!(FeedError::http("twelvedata", None, "connection reset").retryable());
        assert!(!FeedError::http("twelvedata", Some(401), "bad key").retryable());
        assert!(!FeedError::Validation {
            provider: String::from("twelvedata"),
            source: ValidationError::EmptyPayload,
        }
        .retryable());
    }

    #[test]
    fn http_error_message_includes_status_when_known() {
        let with_status = FeedError::http("openmeteo", Some(502), "bad gateway");
        assert_eq!(
            with_status.to_string(),
            "openmeteo upstream failed with status 502: bad gateway"
        );

        let without_status = FeedError::http("openmeteo", None, "dns failure");
        assert_eq!(without_status.to_string(), "openmeteo upstream failed: dns failure");
    }

    #[test]
    fn advisory_errors_are_flagged() {
        assert!(FeedError::CircuitOpen {
            provider: String::from("coingecko"),
        }
        .is_advisory());
        assert!(!FeedError::internal("join failed").is_advisory());
    }
}
