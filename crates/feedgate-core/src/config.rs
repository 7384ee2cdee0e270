//! # Gateway Configuration
//!
//! Plain-value settings loaded from `FEEDGATE_*` variables. Every value has a
//! default, so an empty environment yields a usable (if source-less) gateway.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `FEEDGATE_BUILD_ID` | crate version |
//! | `FEEDGATE_HOME` | `$HOME/.feedgate` |
//! | `FEEDGATE_FETCH_TIMEOUT_MS` | 12000 |
//! | `FEEDGATE_RETRY_COUNT` / `FEEDGATE_RETRY_DELAY_MS` | 1 / 2000 |
//! | `FEEDGATE_CIRCUIT_THRESHOLD` / `FEEDGATE_CIRCUIT_RESET_SECS` | 5 / 300 |
//! | `FEEDGATE_BUDGET_WARNING_RATIO` | 0.8 |
//! | `FEEDGATE_<FEED>_PROVIDER` / `_ACCOUNT` | per feed |
//! | `FEEDGATE_<FEED>_URL` / `_QUOTES_POINTER` / `_AUTH` | unset / unset / `url` |
//! | `FEEDGATE_<FEED>_TTL_SECS` / `_STALE_SECS` | per feed |
//! | `FEEDGATE_<FEED>_OFFSETS` / `_SYMBOLS` / `_BATCHES` / `_ROLLING_SECS` | per feed |
//! | `FEEDGATE_<ACCOUNT>_LIMIT` / `_WINDOW` | per account |

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::budget::{BudgetConfig, BudgetWindow};
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::handler::FeedConfig;
use crate::http_client::KeyPlacement;
use crate::retry::RetryPolicy;
use crate::scheduler::{MinuteOffsets, SchedulePlan};
use crate::{FeedKind, ProviderId, ValidationError};

const BATCH_STARTUP_DELAY: Duration = Duration::from_secs(30);

/// Upstream wiring and refresh settings for one feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    pub feed: FeedConfig,
    pub provider: ProviderId,
    /// Budget account the provider bills against.
    pub account: String,
    pub url: Option<String>,
    pub quotes_pointer: Option<String>,
    pub key_placement: KeyPlacement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountConfig {
    pub name: String,
    pub budget: BudgetConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub build_id: String,
    pub home: PathBuf,
    pub circuit: CircuitBreakerConfig,
    pub feeds: Vec<FeedSettings>,
    pub accounts: BTreeMap<String, AccountConfig>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup: &lookup };

        let build_id = vars
            .string("FEEDGATE_BUILD_ID")
            .unwrap_or_else(|| String::from(env!("CARGO_PKG_VERSION")));
        let home = vars
            .string("FEEDGATE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_home(vars.string("HOME")));

        let fetch_timeout = Duration::from_millis(vars.parse("FEEDGATE_FETCH_TIMEOUT_MS")?.unwrap_or(12_000));
        let retry = RetryPolicy::fixed(
            vars.parse("FEEDGATE_RETRY_COUNT")?.unwrap_or(1),
            Duration::from_millis(vars.parse("FEEDGATE_RETRY_DELAY_MS")?.unwrap_or(2_000)),
        );
        let circuit = CircuitBreakerConfig {
            failure_threshold: vars.parse("FEEDGATE_CIRCUIT_THRESHOLD")?.unwrap_or(5),
            reset_timeout: Duration::from_secs(vars.parse("FEEDGATE_CIRCUIT_RESET_SECS")?.unwrap_or(300)),
        };
        if circuit.failure_threshold == 0 {
            return Err(invalid("FEEDGATE_CIRCUIT_THRESHOLD", "must be greater than zero"));
        }
        let warning_ratio: f64 = vars.parse("FEEDGATE_BUDGET_WARNING_RATIO")?.unwrap_or(0.8);
        if !(0.0..=1.0).contains(&warning_ratio) {
            return Err(invalid("FEEDGATE_BUDGET_WARNING_RATIO", "must be within 0..=1"));
        }

        let mut feeds = Vec::with_capacity(FeedKind::ALL.len());
        for kind in FeedKind::ALL {
            let mut settings = load_feed(&vars, kind)?;
            settings.feed.fetch_timeout = fetch_timeout;
            settings.feed.retry = retry;
            settings.feed.build_id.clone_from(&build_id);
            feeds.push(settings);
        }

        let mut accounts = BTreeMap::new();
        for settings in &feeds {
            if accounts.contains_key(&settings.account) {
                continue;
            }
            let account = load_account(&vars, &settings.account, warning_ratio)?;
            accounts.insert(settings.account.clone(), account);
        }

        Ok(Self {
            build_id,
            home,
            circuit,
            feeds,
            accounts,
        })
    }

    pub fn feed(&self, kind: FeedKind) -> Option<&FeedSettings> {
        self.feeds.iter().find(|settings| settings.feed.kind == kind)
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.home.join("snapshots")
    }
}

struct Vars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Vars<'_> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, ValidationError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(key)
            .map(|value| {
                value
                    .parse::<T>()
                    .map_err(|error| invalid(key, format!("'{value}': {error}")))
            })
            .transpose()
    }
}

fn load_feed(vars: &Vars<'_>, kind: FeedKind) -> Result<FeedSettings, ValidationError> {
    let prefix = format!("FEEDGATE_{}", kind.env_token());
    let key = |suffix: &str| format!("{prefix}_{suffix}");

    let provider = match vars.string(&key("PROVIDER")) {
        Some(value) => ProviderId::parse(&value)?,
        None => default_provider(kind)?,
    };
    let account = match vars.string(&key("ACCOUNT")) {
        Some(value) => ProviderId::parse(&value)?.to_string(),
        None => provider.to_string(),
    };

    let mut feed = FeedConfig::for_kind(kind);
    if let Some(ttl) = vars.parse::<u64>(&key("TTL_SECS"))? {
        feed.ttl = Duration::from_secs(ttl);
    }
    if let Some(stale) = vars.parse::<u64>(&key("STALE_SECS"))? {
        feed.stale_window = Duration::from_secs(stale);
    }
    if let Some(symbols) = vars.string(&key("SYMBOLS")) {
        feed.symbols = symbols
            .split(',')
            .map(str::trim)
            .filter(|symbol| !symbol.is_empty())
            .map(str::to_owned)
            .collect();
    }
    feed.schedule = load_schedule(vars, kind, &feed.schedule, &key)?;
    feed.schedule.validate()?;

    let key_placement = match vars.string(&key("AUTH")) {
        None => KeyPlacement::Url,
        Some(value) => parse_key_placement(&key("AUTH"), &value)?,
    };

    Ok(FeedSettings {
        feed,
        provider,
        account,
        url: vars.string(&key("URL")),
        quotes_pointer: vars.string(&key("QUOTES_POINTER")),
        key_placement,
    })
}

fn load_schedule(
    vars: &Vars<'_>,
    kind: FeedKind,
    default: &SchedulePlan,
    key: &dyn Fn(&str) -> String,
) -> Result<SchedulePlan, ValidationError> {
    if let Some(seconds) = vars.parse::<u64>(&key("ROLLING_SECS"))? {
        return Ok(SchedulePlan::Rolling {
            interval: Duration::from_secs(seconds),
        });
    }

    let offsets = match vars.string(&key("OFFSETS")) {
        Some(value) => MinuteOffsets::parse(&value)?,
        None => match default {
            SchedulePlan::ClockAligned { offsets } | SchedulePlan::Batched { offsets, .. } => {
                offsets.clone()
            }
            SchedulePlan::Rolling { .. } => MinuteOffsets::for_kind(kind),
        },
    };
    let default_batches = match default {
        SchedulePlan::Batched { batch_count, .. } => *batch_count,
        _ => 1,
    };
    let batch_count = vars.parse::<usize>(&key("BATCHES"))?.unwrap_or(default_batches);

    Ok(match batch_count {
        0 => return Err(ValidationError::InvalidBatchCount),
        1 => SchedulePlan::ClockAligned { offsets },
        batch_count => SchedulePlan::Batched {
            offsets,
            batch_count,
            startup_delay: BATCH_STARTUP_DELAY,
        },
    })
}

fn load_account(
    vars: &Vars<'_>,
    account: &str,
    warning_ratio: f64,
) -> Result<AccountConfig, ValidationError> {
    let token = account.replace('-', "_").to_ascii_uppercase();
    let (default_limit, default_window) = default_budget(account);

    let limit = vars
        .parse::<u32>(&format!("FEEDGATE_{token}_LIMIT"))?
        .unwrap_or(default_limit);
    let window = vars
        .parse::<BudgetWindow>(&format!("FEEDGATE_{token}_WINDOW"))?
        .unwrap_or(default_window);

    Ok(AccountConfig {
        name: account.to_owned(),
        budget: BudgetConfig {
            limit,
            window,
            warning_ratio,
        },
    })
}

fn parse_key_placement(key: &str, value: &str) -> Result<KeyPlacement, ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "url" | "query" => Ok(KeyPlacement::Url),
        "bearer" => Ok(KeyPlacement::Bearer),
        _ => match value.split_once(':') {
            Some((kind, header)) if kind.eq_ignore_ascii_case("header") && !header.trim().is_empty() => {
                Ok(KeyPlacement::Header(header.trim().to_owned()))
            }
            _ => Err(invalid(key, format!("expected url, bearer or header:<name>, got '{value}'"))),
        },
    }
}

/// FX and indices share one account so they draw from the same budget.
fn default_provider(kind: FeedKind) -> Result<ProviderId, ValidationError> {
    let name = match kind {
        FeedKind::Fx | FeedKind::Indices => "twelvedata",
        FeedKind::Crypto => "coingecko",
        FeedKind::Commodities => "fmp",
        FeedKind::Weather => "open-meteo",
    };
    ProviderId::parse(name)
}

fn default_budget(account: &str) -> (u32, BudgetWindow) {
    match account {
        "twelvedata" => (800, BudgetWindow::Day),
        "coingecko" => (30, BudgetWindow::Minute),
        "fmp" => (250, BudgetWindow::Day),
        "open-meteo" => (10_000, BudgetWindow::Day),
        _ => (1_000, BudgetWindow::Day),
    }
}

fn default_home(home: Option<String>) -> PathBuf {
    match home {
        Some(home) => PathBuf::from(home).join(".feedgate"),
        None => PathBuf::from(".feedgate"),
    }
}

fn invalid(key: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidConfig {
        key: key.to_owned(),
        message: message.into(),
    }
}
