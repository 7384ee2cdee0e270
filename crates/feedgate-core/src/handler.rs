//! # Feed Handler
//!
//! Orchestrates one feed. Per [`FeedHandler::get_data`]:
//!
//! | Step | Check | On refusal |
//! |------|-------|------------|
//! | 1 | circuit breaker `can_attempt` | degrade |
//! | 2 | budget `consume(cost)` | degrade |
//! | 3 | fresh live cache entry and no slot passed | serve `cached` |
//! | 4 | deduplicated upstream fetch | degrade on failure |
//! | 5 | degrade: cache (even stale), then snapshot, then an empty payload | |
//!
//! Every response carries [`EnvelopeMeta`]; adapter errors never escape.
//! [`FeedHandler::refresh`] runs steps 1, 2 and 4 for the background loop and
//! shares the same deduplicator, so a background tick and a user call never
//! reach the upstream twice for one key.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::budget::{BudgetManager, BudgetConfig, BudgetWindow};
use crate::cache::GenericCache;
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::clock::Clock;
use crate::dedup::RequestDeduplicator;
use crate::envelope::{
    BudgetMeta, DegradeReason, EnvelopeMeta, FeedResponseEnvelope, ServeMode,
};
use crate::feed_source::{FeedKey, FeedSource};
use crate::retry::RetryPolicy;
use crate::scheduler::{BatchRotation, FeedScheduler, MinuteOffsets, RollingQueue, SchedulePlan};
use crate::snapshot::{SaveOutcome, SsotSnapshot};
use crate::{FeedError, FeedItem, FeedKind, ProviderId, QuoteSet, UtcDateTime, ValidationError};

/// Per-feed cache, schedule and fetch settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub kind: FeedKind,
    pub ttl: Duration,
    pub stale_window: Duration,
    pub schedule: SchedulePlan,
    /// Symbol catalog. Split into batches or rolled through one symbol at a time
    /// depending on `schedule`; clock-aligned feeds request it as one set.
    pub symbols: Vec<String>,
    pub fetch_timeout: Duration,
    pub retry: RetryPolicy,
    pub build_id: String,
}

impl FeedConfig {
    pub fn for_kind(kind: FeedKind) -> Self {
        let (schedule, stale_window, symbols): (SchedulePlan, u64, &[&str]) = match kind {
            FeedKind::Fx => (
                SchedulePlan::clock_aligned(kind),
                3_600,
                &["EUR/USD", "GBP/USD", "USD/JPY", "USD/CHF", "AUD/USD"],
            ),
            FeedKind::Crypto => (SchedulePlan::clock_aligned(kind), 3_600, &["BTC", "ETH", "SOL"]),
            FeedKind::Indices => (
                SchedulePlan::clock_aligned(kind),
                3_600,
                &["SPX", "NDX", "DJI", "UKX", "DAX"],
            ),
            FeedKind::Commodities => (
                SchedulePlan::Batched {
                    offsets: MinuteOffsets::for_kind(kind),
                    batch_count: 2,
                    startup_delay: Duration::from_secs(30),
                },
                7_200,
                &["GC", "SI", "CL", "NG", "HG", "PL"],
            ),
            FeedKind::Weather => (
                SchedulePlan::clock_aligned(kind),
                7_200,
                &["London", "New York", "Tokyo"],
            ),
        };

        Self {
            kind,
            ttl: Duration::from_secs(1_800),
            stale_window: Duration::from_secs(stale_window),
            schedule,
            symbols: symbols.iter().map(|symbol| (*symbol).to_owned()).collect(),
            fetch_timeout: Duration::from_secs(12),
            retry: RetryPolicy::default(),
            build_id: String::from(env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Where a cached payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOrigin {
    Live,
    Snapshot,
}

#[derive(Debug, Clone, PartialEq)]
struct CachedFeed<Q> {
    payload: Arc<QuoteSet<Q>>,
    provider: ProviderId,
    origin: CacheOrigin,
}

/// Result of a background refresh tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed { quotes: usize },
    Skipped(SkipReason),
    Failed(FeedError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    InFlight,
    CircuitOpen,
    BudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheTrace {
    pub origin: CacheOrigin,
    pub fetched_at: UtcDateTime,
    pub age_ms: u64,
    pub is_stale: bool,
    pub quotes: usize,
}

/// Per-feed diagnostics for `/trace`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedTrace {
    pub feed: FeedKind,
    pub provider: ProviderId,
    pub account: String,
    pub schedule: &'static str,
    pub next_slot_at: UtcDateTime,
    pub in_flight: usize,
    pub cache: Option<CacheTrace>,
}

/// Object-safe view of a feed handler, independent of its item type.
pub trait Feed: Send + Sync {
    fn kind(&self) -> FeedKind;

    fn scheduler(&self) -> &FeedScheduler;

    /// Response envelope serialized to JSON.
    fn get_json<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Value, FeedError>> + Send + 'a>>;

    fn refresh<'a>(&'a self, key: FeedKey) -> Pin<Box<dyn Future<Output = RefreshOutcome> + Send + 'a>>;

    fn prewarm<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

    /// Keys to fetch when the background loop starts, each with its delay.
    fn startup_keys(&self) -> Vec<(Duration, FeedKey)>;

    /// Key to fetch at the slot reached at `now`.
    fn slot_key(&self, now: UtcDateTime) -> FeedKey;

    fn trace(&self) -> FeedTrace;
}

/// Resilient handler for one feed. Cheap to clone.
pub struct FeedHandler<Q: FeedItem> {
    inner: Arc<HandlerInner<Q>>,
}

impl<Q: FeedItem> Clone for FeedHandler<Q> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct HandlerInner<Q: FeedItem> {
    config: FeedConfig,
    source: Arc<dyn FeedSource>,
    breaker: Arc<CircuitBreaker>,
    budget: Arc<BudgetManager>,
    snapshot: Arc<SsotSnapshot<QuoteSet<Q>>>,
    clock: Arc<dyn Clock>,
    cache: GenericCache<CachedFeed<Q>>,
    dedup: RequestDeduplicator<Arc<QuoteSet<Q>>>,
    scheduler: FeedScheduler,
    batches: Option<BatchRotation>,
    rolling: Mutex<RollingQueue>,
}

/// Builds a [`FeedHandler`]. Shared components default to private instances: a
/// breaker with default thresholds, an unlimited daily budget and an in-memory
/// snapshot.
pub struct FeedHandlerBuilder<Q: FeedItem> {
    config: FeedConfig,
    source: Arc<dyn FeedSource>,
    clock: Arc<dyn Clock>,
    breaker: Option<Arc<CircuitBreaker>>,
    budget: Option<Arc<BudgetManager>>,
    snapshot: Option<Arc<SsotSnapshot<QuoteSet<Q>>>>,
}

impl<Q: FeedItem> FeedHandlerBuilder<Q> {
    pub fn breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn budget(mut self, budget: Arc<BudgetManager>) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn snapshot(mut self, snapshot: Arc<SsotSnapshot<QuoteSet<Q>>>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn build(self) -> Result<FeedHandler<Q>, ValidationError> {
        let config = self.config;
        if config.kind != Q::KIND {
            return Err(ValidationError::InvalidConfig {
                key: format!("feed {}", config.kind),
                message: format!("handler items belong to the {} feed", Q::KIND),
            });
        }

        let scheduler = FeedScheduler::new(config.schedule.clone())?;
        let batches = match &config.schedule {
            SchedulePlan::Batched {
                batch_count,
                startup_delay,
                ..
            } => Some(BatchRotation::new(&config.symbols, *batch_count, *startup_delay)?),
            _ => None,
        };
        let rolling = RollingQueue::from_symbols(&config.symbols);

        let provider = self.source.provider().clone();
        let clock = self.clock;
        let breaker = self.breaker.unwrap_or_else(|| {
            Arc::new(CircuitBreaker::new(
                provider.clone(),
                CircuitBreakerConfig::default(),
                Arc::clone(&clock),
            ))
        });
        let budget = self.budget.unwrap_or_else(|| {
            Arc::new(BudgetManager::new(
                provider.as_str(),
                BudgetConfig::new(u32::MAX, BudgetWindow::Day),
                Arc::clone(&clock),
            ))
        });
        let snapshot = self
            .snapshot
            .unwrap_or_else(|| Arc::new(SsotSnapshot::in_memory(Arc::clone(&clock))));

        Ok(FeedHandler {
            inner: Arc::new(HandlerInner {
                cache: GenericCache::new(Arc::clone(&clock), config.stale_window),
                dedup: RequestDeduplicator::new(),
                scheduler,
                batches,
                rolling: Mutex::new(rolling),
                config,
                source: self.source,
                breaker,
                budget,
                snapshot,
                clock,
            }),
        })
    }
}

impl<Q: FeedItem> FeedHandler<Q> {
    pub fn builder(
        config: FeedConfig,
        source: Arc<dyn FeedSource>,
        clock: Arc<dyn Clock>,
    ) -> FeedHandlerBuilder<Q> {
        FeedHandlerBuilder {
            config,
            source,
            clock,
            breaker: None,
            budget: None,
            snapshot: None,
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.inner.config
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.inner.breaker
    }

    pub fn budget(&self) -> &Arc<BudgetManager> {
        &self.inner.budget
    }

    /// Serves the feed. Never fails: upstream problems degrade the `mode`.
    pub async fn get_data(&self) -> FeedResponseEnvelope<QuoteSet<Q>> {
        let inner = &self.inner;
        let request_id = Uuid::new_v4().to_string();

        if !inner.breaker.can_attempt() {
            debug!(feed = %inner.config.kind, "circuit refuses upstream call");
            return inner.degrade(request_id, DegradeReason::CircuitOpen).await;
        }

        let (key, rolled) = inner.request_key(inner.clock.now());
        let cost = inner.source.cost(&key);
        if inner.budget.consume(cost).is_err() {
            inner.breaker.release_trial();
            return inner.degrade(request_id, DegradeReason::BudgetExhausted).await;
        }

        if let Some(envelope) = inner.serve_fresh(&request_id) {
            inner.breaker.release_trial();
            return envelope;
        }

        if let Some(symbol) = rolled {
            inner.rolling_queue().commit(&symbol);
        }
        match inner.fetch_shared(key).await {
            Ok(payload) => inner.envelope(
                request_id,
                ServeMode::Live,
                inner.source.provider().as_str(),
                Some(0),
                None,
                (*payload).clone(),
            ),
            Err(_) => inner.degrade(request_id, DegradeReason::UpstreamFailed).await,
        }
    }

    /// Background refresh for one key: circuit, budget, then the shared fetch.
    pub async fn refresh(&self, key: FeedKey) -> RefreshOutcome {
        self.inner.refresh(key).await
    }

    /// Seeds an empty cache from the snapshot. Returns whether anything was loaded.
    pub async fn prewarm(&self) -> bool {
        self.inner.prewarm().await
    }

    pub fn trace(&self) -> FeedTrace {
        self.inner.trace()
    }
}

impl<Q: FeedItem> HandlerInner<Q> {
    fn cache_key(&self) -> &'static str {
        self.config.kind.as_str()
    }

    fn serve_fresh(&self, request_id: &str) -> Option<FeedResponseEnvelope<QuoteSet<Q>>> {
        let hit = self.cache.get(self.cache_key())?;
        let now = self.clock.now();
        let fresh = hit.value.origin == CacheOrigin::Live
            && !hit.is_stale
            && !self.scheduler.is_refresh_due(hit.fetched_at, now);
        if !fresh {
            return None;
        }

        Some(self.envelope(
            request_id.to_owned(),
            ServeMode::Cached,
            hit.value.provider.as_str(),
            Some(duration_ms(hit.age)),
            None,
            (*hit.value.payload).clone(),
        ))
    }

    async fn degrade(
        &self,
        request_id: String,
        reason: DegradeReason,
    ) -> FeedResponseEnvelope<QuoteSet<Q>> {
        if let Some(hit) = self.cache.get(self.cache_key()) {
            let mode = match hit.value.origin {
                CacheOrigin::Live => ServeMode::Cached,
                CacheOrigin::Snapshot => ServeMode::Fallback,
            };
            return self.envelope(
                request_id,
                mode,
                hit.value.provider.as_str(),
                Some(duration_ms(hit.age)),
                Some(reason),
                (*hit.value.payload).clone(),
            );
        }

        if let Some(record) = self.snapshot.load().await {
            let age = self.clock.now().duration_since(record.saved_at);
            return self.envelope(
                request_id,
                ServeMode::Fallback,
                self.source.provider().as_str(),
                Some(duration_ms(age)),
                Some(reason),
                record.data,
            );
        }

        warn!(feed = %self.config.kind, reason = ?reason, "no cached or snapshot data, serving empty payload");
        self.envelope(
            request_id,
            ServeMode::Fallback,
            self.source.provider().as_str(),
            None,
            Some(DegradeReason::NoData),
            QuoteSet::empty(),
        )
    }

    fn envelope(
        &self,
        request_id: String,
        mode: ServeMode,
        provider: &str,
        age_ms: Option<u64>,
        reason: Option<DegradeReason>,
        data: QuoteSet<Q>,
    ) -> FeedResponseEnvelope<QuoteSet<Q>> {
        let budget = self.budget.snapshot();
        FeedResponseEnvelope::new(
            EnvelopeMeta {
                mode,
                source_provider: provider.to_owned(),
                budget: Some(BudgetMeta::from(&budget)),
                request_id,
                build_id: self.config.build_id.clone(),
                generated_at: self.clock.now(),
                feed: self.config.kind,
                age_ms,
                reason,
            },
            data,
        )
    }

    async fn refresh(self: &Arc<Self>, key: FeedKey) -> RefreshOutcome {
        if self.dedup.is_in_flight(&key.dedup_key()) {
            debug!(feed = %self.config.kind, key = %key, "refresh already in flight");
            return RefreshOutcome::Skipped(SkipReason::InFlight);
        }
        if !self.breaker.can_attempt() {
            return RefreshOutcome::Skipped(SkipReason::CircuitOpen);
        }
        if self.budget.consume(self.source.cost(&key)).is_err() {
            self.breaker.release_trial();
            return RefreshOutcome::Skipped(SkipReason::BudgetExhausted);
        }

        match self.fetch_shared(key).await {
            Ok(payload) => RefreshOutcome::Refreshed {
                quotes: payload.len(),
            },
            Err(error) => RefreshOutcome::Failed(error),
        }
    }

    async fn fetch_shared(self: &Arc<Self>, key: FeedKey) -> Result<Arc<QuoteSet<Q>>, FeedError> {
        let dedup_key = key.dedup_key();
        let inner = Arc::clone(self);
        self.dedup
            .run(&dedup_key, move || async move { inner.fetch_and_store(key).await })
            .await
    }

    /// One deduplicated upstream call including retries. The caller has already
    /// paid for the first attempt; each retry pays again.
    async fn fetch_and_store(&self, key: FeedKey) -> Result<Arc<QuoteSet<Q>>, FeedError> {
        let provider = self.source.provider().clone();
        let outcome = OutcomeGuard::new(Arc::clone(&self.breaker), self.config.kind);
        let mut attempt = 0_u32;

        loop {
            let error = match self.fetch_once(&key).await {
                Ok(quotes) => {
                    outcome.success();
                    let stored = self.store(&key, quotes, &provider);
                    if let SaveOutcome::Failed(error) = self.snapshot.save(&stored).await {
                        warn!(feed = %self.config.kind, error = %error, "snapshot not updated");
                    }
                    info!(
                        feed = %self.config.kind,
                        provider = %provider,
                        key = %key,
                        quotes = stored.len(),
                        "feed refreshed"
                    );
                    return Ok(stored);
                }
                Err(error) => error,
            };

            warn!(
                feed = %self.config.kind,
                provider = %provider,
                key = %key,
                attempt,
                code = error.code(),
                error = %error,
                "upstream fetch failed"
            );

            if self.config.retry.should_retry(attempt, &error) {
                self.clock.sleep(self.config.retry.delay).await;
                if self.budget.consume(self.source.cost(&key)).is_ok() {
                    attempt += 1;
                    continue;
                }
            }

            outcome.failure();
            return Err(error);
        }
    }

    async fn fetch_once(&self, key: &FeedKey) -> Result<QuoteSet<Q>, FeedError> {
        let provider = self.source.provider();
        let raw = tokio::time::timeout(self.config.fetch_timeout, self.source.fetch(key))
            .await
            .map_err(|_| FeedError::UpstreamTimeout {
                provider: provider.to_string(),
                timeout_ms: duration_ms(self.config.fetch_timeout),
            })??;

        QuoteSet::from_value(raw.as_value()).map_err(|source| FeedError::Validation {
            provider: provider.to_string(),
            source,
        })
    }

    /// Full-catalog payloads replace the cached set; batch and rolling ones are
    /// merged into it.
    fn store(&self, key: &FeedKey, quotes: QuoteSet<Q>, provider: &ProviderId) -> Arc<QuoteSet<Q>> {
        let ttl = self.config.ttl;
        let partial = !key.is_whole_feed()
            && !matches!(self.config.schedule, SchedulePlan::ClockAligned { .. });
        let stored = self.cache.update(self.cache_key(), ttl, |current| {
            let payload = match current {
                Some(current) if partial => {
                    let mut merged = (*current.payload).clone();
                    merged.merge(quotes);
                    merged
                }
                _ => quotes,
            };
            CachedFeed {
                payload: Arc::new(payload),
                provider: provider.clone(),
                origin: CacheOrigin::Live,
            }
        });
        stored.payload
    }

    async fn prewarm(&self) -> bool {
        if !self.cache.is_empty() {
            return false;
        }
        let Some(record) = self.snapshot.load().await else {
            return false;
        };

        self.cache.set_at(
            self.cache_key(),
            CachedFeed {
                payload: Arc::new(record.data),
                provider: self.source.provider().clone(),
                origin: CacheOrigin::Snapshot,
            },
            self.config.ttl,
            record.saved_at,
        );
        info!(feed = %self.config.kind, saved_at = %record.saved_at, "cache prewarmed from snapshot");
        true
    }

    fn needs_refresh(&self) -> bool {
        match self.cache.get(self.cache_key()) {
            Some(hit) => {
                hit.value.origin == CacheOrigin::Snapshot
                    || self.scheduler.is_refresh_due(hit.fetched_at, self.clock.now())
            }
            None => true,
        }
    }

    fn startup_keys(&self) -> Vec<(Duration, FeedKey)> {
        if !self.needs_refresh() {
            return Vec::new();
        }
        let kind = self.config.kind;
        match &self.batches {
            Some(rotation) if !rotation.is_empty() => (0..rotation.len())
                .filter_map(|index| {
                    let batch = rotation.batch(index)?;
                    Some((rotation.startup_delay_for(index), FeedKey::symbols(kind, batch)))
                })
                .collect(),
            _ => vec![(Duration::ZERO, self.slot_key(self.clock.now()))],
        }
    }

    /// Key for a user call. On rolling plans the next symbol is only peeked;
    /// `get_data` commits it once the call goes upstream.
    fn request_key(&self, now: UtcDateTime) -> (FeedKey, Option<String>) {
        if let SchedulePlan::Rolling { .. } = self.config.schedule {
            if let Some(symbol) = self.rolling_queue().peek_symbol() {
                return (FeedKey::symbols(self.config.kind, [&symbol]), Some(symbol));
            }
        }
        (self.slot_key(now), None)
    }

    fn rolling_queue(&self) -> std::sync::MutexGuard<'_, RollingQueue> {
        self.rolling
            .lock()
            .expect("rolling queue lock is not poisoned")
    }
    fn slot_key(&self, now: UtcDateTime) -> FeedKey {
        let kind = self.config.kind;
        match &self.config.schedule {
            SchedulePlan::ClockAligned { .. } => FeedKey::symbols(kind, &self.config.symbols),
            SchedulePlan::Batched { .. } => self
                .batches
                .as_ref()
                .and_then(|rotation| rotation.batch(rotation.current_batch(now.hour_index())))
                .map(|batch| FeedKey::symbols(kind, batch))
                .unwrap_or_else(|| FeedKey::whole(kind)),
            SchedulePlan::Rolling { .. } => self
                .rolling_queue()
                .next_symbol()
                .map(|symbol| FeedKey::symbols(kind, [symbol]))
                .unwrap_or_else(|| FeedKey::whole(kind)),
        }
    }

    fn trace(&self) -> FeedTrace {
        let now = self.clock.now();
        let cache = self.cache.get(self.cache_key()).map(|hit| CacheTrace {
            origin: hit.value.origin,
            fetched_at: hit.fetched_at,
            age_ms: duration_ms(hit.age),
            is_stale: hit.is_stale,
            quotes: hit.value.payload.len(),
        });

        FeedTrace {
            feed: self.config.kind,
            provider: self.source.provider().clone(),
            account: self.budget.account().to_owned(),
            schedule: self.scheduler.plan().label(),
            next_slot_at: self.scheduler.next_slot_after(now),
            in_flight: self.dedup.in_flight(),
            cache,
        }
    }
}

impl<Q: FeedItem> Feed for FeedHandler<Q> {
    fn kind(&self) -> FeedKind {
        self.inner.config.kind
    }

    fn scheduler(&self) -> &FeedScheduler {
        &self.inner.scheduler
    }

    fn get_json<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Value, FeedError>> + Send + 'a>> {
        Box::pin(async move {
            let envelope = self.get_data().await;
            serde_json::to_value(envelope).map_err(|error| {
                FeedError::internal(format!("failed to encode {} envelope: {error}", Q::KIND))
            })
        })
    }

    fn refresh<'a>(&'a self, key: FeedKey) -> Pin<Box<dyn Future<Output = RefreshOutcome> + Send + 'a>> {
        Box::pin(self.inner.refresh(key))
    }

    fn prewarm<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(self.inner.prewarm())
    }

    fn startup_keys(&self) -> Vec<(Duration, FeedKey)> {
        self.inner.startup_keys()
    }

    fn slot_key(&self, now: UtcDateTime) -> FeedKey {
        self.inner.slot_key(now)
    }

    fn trace(&self) -> FeedTrace {
        self.inner.trace()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Records exactly one breaker outcome per upstream call. Dropped unsettled
/// (the fetch task panicked or was aborted), it counts as a failure so a
/// half-open trial never stays pending.
struct OutcomeGuard {
    breaker: Arc<CircuitBreaker>,
    feed: FeedKind,
    settled: bool,
}

impl OutcomeGuard {
    fn new(breaker: Arc<CircuitBreaker>, feed: FeedKind) -> Self {
        Self {
            breaker,
            feed,
            settled: false,
        }
    }

    fn success(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for OutcomeGuard {
    fn drop(&mut self) {
        if !self.settled {
            warn!(feed = %self.feed, "upstream call ended without an outcome, counting a failure");
            self.breaker.record_failure();
        }
    }
}
