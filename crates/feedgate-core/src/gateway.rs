//! # Feed Gateway
//!
//! Registry of every configured feed plus the shared budgets and breakers they
//! draw from. The outer HTTP router maps `GET /<feed>` to [`FeedGateway::get`] and
//! `GET /trace` to [`FeedGateway::trace`].
//!
//! Feeds billing against the same account share one [`BudgetManager`]; feeds
//! served by the same provider share one [`CircuitBreaker`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::budget::{BudgetManager, BudgetSnapshot};
use crate::circuit_breaker::{CircuitBreaker, CircuitSnapshot};
use crate::clock::{Clock, SystemClock};
use crate::config::{FeedSettings, GatewayConfig};
use crate::credentials::{CredentialsProvider, EnvCredentials};
use crate::feed_source::FeedSource;
use crate::handler::{Feed, FeedHandler, FeedTrace};
use crate::http_client::{HttpClient, HttpFeedSource, HttpSourceConfig, ReqwestHttpClient};
use crate::refresh::RefreshTask;
use crate::snapshot::SsotSnapshot;
use crate::{
    CommodityQuote, CryptoQuote, FeedError, FeedItem, FeedKind, FxQuote, IndexQuote,
    ProviderId, UtcDateTime, ValidationError, WeatherDatum,
};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("feed '{feed}' is not configured")]
    UnknownFeed { feed: FeedKind },

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Diagnostics served on `/trace`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceReport {
    pub build_id: String,
    pub generated_at: UtcDateTime,
    pub budgets: Vec<BudgetSnapshot>,
    pub circuits: Vec<CircuitSnapshot>,
    pub feeds: Vec<FeedTrace>,
}

/// Next scheduled refresh of one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotPreview {
    pub feed: FeedKind,
    pub schedule: &'static str,
    pub next_slot_at: UtcDateTime,
    pub ms_until: u64,
}

pub struct FeedGateway {
    build_id: String,
    clock: Arc<dyn Clock>,
    feeds: BTreeMap<FeedKind, Arc<dyn Feed>>,
    budgets: BTreeMap<String, Arc<BudgetManager>>,
    breakers: BTreeMap<ProviderId, Arc<CircuitBreaker>>,
    tasks: tokio::sync::Mutex<Vec<RefreshTask>>,
}

impl FeedGateway {
    pub fn builder(config: GatewayConfig) -> FeedGatewayBuilder {
        FeedGatewayBuilder::new(config)
    }

    pub fn feeds(&self) -> Vec<FeedKind> {
        self.feeds.keys().copied().collect()
    }

    pub fn feed(&self, kind: FeedKind) -> Option<Arc<dyn Feed>> {
        self.feeds.get(&kind).cloned()
    }

    pub fn budget(&self, account: &str) -> Option<&Arc<BudgetManager>> {
        self.budgets.get(account)
    }

    pub fn breaker(&self, provider: &ProviderId) -> Option<&Arc<CircuitBreaker>> {
        self.breakers.get(provider)
    }

    /// Response envelope for `feed` as JSON.
    pub async fn get(&self, feed: FeedKind) -> Result<Value, GatewayError> {
        let handler = self
            .feeds
            .get(&feed)
            .ok_or(GatewayError::UnknownFeed { feed })?;
        Ok(handler.get_json().await?)
    }

    pub fn trace(&self) -> TraceReport {
        TraceReport {
            build_id: self.build_id.clone(),
            generated_at: self.clock.now(),
            budgets: self.budgets.values().map(|budget| budget.snapshot()).collect(),
            circuits: self
                .breakers
                .values()
                .map(|breaker| breaker.snapshot())
                .collect(),
            feeds: self.feeds.values().map(|feed| feed.trace()).collect(),
        }
    }

    pub fn schedule(&self, now: UtcDateTime) -> Vec<SlotPreview> {
        self.feeds
            .values()
            .map(|feed| {
                let scheduler = feed.scheduler();
                SlotPreview {
                    feed: feed.kind(),
                    schedule: scheduler.plan().label(),
                    next_slot_at: scheduler.next_slot_after(now),
                    ms_until: scheduler.ms_until_next_slot(now),
                }
            })
            .collect()
    }

    /// Seeds every empty cache from its snapshot. Returns how many feeds were seeded.
    pub async fn prewarm_all(&self) -> usize {
        let mut seeded = 0;
        for feed in self.feeds.values() {
            if feed.prewarm().await {
                seeded += 1;
            }
        }
        seeded
    }

    /// Starts one refresh loop per feed. Calling it again while loops run is a no-op.
    pub async fn start_background(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return;
        }
        for feed in self.feeds.values() {
            tasks.push(RefreshTask::spawn(Arc::clone(feed), Arc::clone(&self.clock)));
        }
        info!(feeds = tasks.len(), "background refresh started");
    }

    pub async fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        let count = tasks.len();
        for task in tasks {
            task.stop().await;
        }
        if count > 0 {
            info!(feeds = count, "background refresh stopped");
        }
    }

    pub async fn running_tasks(&self) -> usize {
        self.tasks.lock().await.len()
    }
}

/// Assembles a [`FeedGateway`] from [`GatewayConfig`].
///
/// Feeds get an explicitly injected [`FeedSource`] when one is registered,
/// otherwise an [`HttpFeedSource`] when `FEEDGATE_<FEED>_URL` is set. Feeds with
/// neither are left out.
pub struct FeedGatewayBuilder {
    config: GatewayConfig,
    clock: Arc<dyn Clock>,
    http_client: Option<Arc<dyn HttpClient>>,
    credentials: Option<Arc<dyn CredentialsProvider>>,
    sources: BTreeMap<FeedKind, Arc<dyn FeedSource>>,
    persist_snapshots: bool,
}

impl FeedGatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            http_client: None,
            credentials: None,
            sources: BTreeMap::new(),
            persist_snapshots: true,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialsProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_source(mut self, feed: FeedKind, source: Arc<dyn FeedSource>) -> Self {
        self.sources.insert(feed, source);
        self
    }

    /// Keeps snapshots in memory instead of under `<home>/snapshots`.
    pub fn in_memory_snapshots(mut self) -> Self {
        self.persist_snapshots = false;
        self
    }

    pub fn build(mut self) -> Result<FeedGateway, ValidationError> {
        let http_client = self
            .http_client
            .take()
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let credentials = self
            .credentials
            .take()
            .unwrap_or_else(|| Arc::new(EnvCredentials::new()));

        let mut feeds: BTreeMap<FeedKind, Arc<dyn Feed>> = BTreeMap::new();
        let mut budgets: BTreeMap<String, Arc<BudgetManager>> = BTreeMap::new();
        let mut breakers: BTreeMap<ProviderId, Arc<CircuitBreaker>> = BTreeMap::new();

        for settings in &self.config.feeds {
            let kind = settings.feed.kind;
            let source = match self.sources.remove(&kind) {
                Some(source) => source,
                None => match &settings.url {
                    Some(url) => http_source(settings, url, &http_client, &credentials),
                    None => {
                        debug!(feed = %kind, "no source configured, feed disabled");
                        continue;
                    }
                },
            };

            let account = self.config.accounts.get(&settings.account).ok_or_else(|| {
                ValidationError::InvalidConfig {
                    key: format!("FEEDGATE_{}_ACCOUNT", kind.env_token()),
                    message: format!("account '{}' has no budget", settings.account),
                }
            })?;
            let budget = budgets
                .entry(settings.account.clone())
                .or_insert_with(|| {
                    Arc::new(BudgetManager::new(
                        account.name.clone(),
                        account.budget,
                        Arc::clone(&self.clock),
                    ))
                })
                .clone();
            let breaker = breakers
                .entry(source.provider().clone())
                .or_insert_with(|| {
                    Arc::new(CircuitBreaker::new(
                        source.provider().clone(),
                        self.config.circuit,
                        Arc::clone(&self.clock),
                    ))
                })
                .clone();

            let parts = FeedParts {
                settings,
                source,
                clock: Arc::clone(&self.clock),
                breaker,
                budget,
                snapshot_path: self
                    .persist_snapshots
                    .then(|| self.config.snapshot_dir().join(format!("{kind}.json"))),
            };
            let feed = match kind {
                FeedKind::Fx => parts.build::<FxQuote>()?,
                FeedKind::Crypto => parts.build::<CryptoQuote>()?,
                FeedKind::Commodities => parts.build::<CommodityQuote>()?,
                FeedKind::Indices => parts.build::<IndexQuote>()?,
                FeedKind::Weather => parts.build::<WeatherDatum>()?,
            };
            feeds.insert(kind, feed);
        }

        info!(feeds = feeds.len(), accounts = budgets.len(), "feed gateway ready");
        Ok(FeedGateway {
            build_id: self.config.build_id,
            clock: self.clock,
            feeds,
            budgets,
            breakers,
            tasks: tokio::sync::Mutex::new(Vec::new()),
        })
    }
}

struct FeedParts<'a> {
    settings: &'a FeedSettings,
    source: Arc<dyn FeedSource>,
    clock: Arc<dyn Clock>,
    breaker: Arc<CircuitBreaker>,
    budget: Arc<BudgetManager>,
    snapshot_path: Option<PathBuf>,
}

impl FeedParts<'_> {
    fn build<Q: FeedItem>(self) -> Result<Arc<dyn Feed>, ValidationError> {
        let snapshot = match self.snapshot_path {
            Some(path) => SsotSnapshot::new(path, Arc::clone(&self.clock)),
            None => SsotSnapshot::in_memory(Arc::clone(&self.clock)),
        };
        let handler = FeedHandler::<Q>::builder(self.settings.feed.clone(), self.source, self.clock)
            .breaker(self.breaker)
            .budget(self.budget)
            .snapshot(Arc::new(snapshot))
            .build()?;
        Ok(Arc::new(handler))
    }
}

fn http_source(
    settings: &FeedSettings,
    url: &str,
    http_client: &Arc<dyn HttpClient>,
    credentials: &Arc<dyn CredentialsProvider>,
) -> Arc<dyn FeedSource> {
    let timeout_ms = u64::try_from(settings.feed.fetch_timeout.as_millis()).unwrap_or(u64::MAX);
    let mut config = HttpSourceConfig::new(settings.provider.clone(), url)
        .with_key_placement(settings.key_placement.clone())
        .with_timeout_ms(timeout_ms);
    if let Some(pointer) = &settings.quotes_pointer {
        config = config.with_quotes_pointer(pointer.clone());
    }
    Arc::new(HttpFeedSource::new(
        config,
        Arc::clone(http_client),
        Arc::clone(credentials),
    ))
}
