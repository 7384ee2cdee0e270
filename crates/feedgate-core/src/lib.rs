//! # Feedgate Core
//!
//! Resilience core for a market and weather feed gateway. Turns unreliable,
//! rate-limited upstream APIs into one dependable pull-based feed per category.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`budget`] | Shared per-account call budgets (minute/day windows) |
//! | [`cache`] | Stale-while-revalidate cache |
//! | [`circuit_breaker`] | Per-provider circuit breaker |
//! | [`clock`] | System and manual clocks |
//! | [`config`] | `FEEDGATE_*` configuration |
//! | [`credentials`] | Per-call API key lookup |
//! | [`dedup`] | In-flight request coalescing |
//! | [`domain`] | Validated feed items |
//! | [`envelope`] | Response envelope and meta |
//! | [`feed_source`] | Upstream adapter contract |
//! | [`gateway`] | Feed registry used by the HTTP router |
//! | [`handler`] | Per-feed orchestration |
//! | [`http_client`] | HTTP transport and generic HTTP source |
//! | [`logging`] | tracing subscriber setup |
//! | [`refresh`] | Background refresh loops |
//! | [`retry`] | Fixed retry policy |
//! | [`scheduler`] | Clock-aligned, batched and rolling schedules |
//! | [`snapshot`] | Last-known-good persistence |
//!
//! ## Request Flow
//!
//! ```text
//! get_data()
//!   ├─ circuit breaker ── open ───────────────┐
//!   ├─ budget ─────────── exhausted ──────────┤
//!   ├─ cache fresh? ───── yes → cached        │
//!   └─ dedup → source ─── ok → live           │
//!                  └───── err ────────────────┤
//!                                             ▼
//!                         cache (stale ok) → snapshot → empty
//! ```

pub mod budget;
pub mod cache;
pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod dedup;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod feed_source;
pub mod gateway;
pub mod handler;
pub mod http_client;
pub mod logging;
pub mod refresh;
pub mod retry;
pub mod scheduler;
pub mod snapshot;
pub mod source;

pub use budget::{BudgetConfig, BudgetManager, BudgetSnapshot, BudgetStatus, BudgetWindow};
pub use cache::{CacheEntry, CacheHit, GenericCache};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AccountConfig, FeedSettings, GatewayConfig};
pub use credentials::{CredentialsProvider, EnvCredentials, StaticCredentials};
pub use dedup::RequestDeduplicator;
pub use domain::{
    CommodityQuote, CryptoQuote, FeedItem, FxQuote, IndexQuote, QuoteSet, UtcDateTime,
    WeatherDatum,
};
pub use envelope::{BudgetMeta, DegradeReason, EnvelopeMeta, FeedResponseEnvelope, ServeMode};
pub use error::{CoreError, FeedError, ValidationError};
pub use feed_source::{FeedKey, FeedSource, RawPayload};
pub use gateway::{FeedGateway, FeedGatewayBuilder, GatewayError, SlotPreview, TraceReport};
pub use handler::{
    CacheOrigin, CacheTrace, Feed, FeedConfig, FeedHandler, FeedHandlerBuilder, FeedTrace,
    RefreshOutcome, SkipReason,
};
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpFeedSource, HttpRequest, HttpResponse, HttpSourceConfig,
    KeyPlacement, ReqwestHttpClient,
};
pub use refresh::RefreshTask;
pub use retry::RetryPolicy;
pub use scheduler::{
    BatchRotation, FeedScheduler, MinuteOffsets, RollingItem, RollingQueue, SchedulePlan,
};
pub use snapshot::{SaveOutcome, SnapshotRecord, SsotSnapshot};
pub use source::{FeedKind, ProviderId};
