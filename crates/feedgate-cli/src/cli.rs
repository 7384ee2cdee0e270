//! CLI argument definitions for feedgate.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fetch` | Serve one feed through the resilience pipeline |
//! | `trace` | Print budgets, circuits and cache state |
//! | `schedule` | Show the next refresh slot of every feed |
//! | `watch` | Run background refresh loops until interrupted |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--log-level` | `info` | Default tracing filter when `FEEDGATE_LOG` is unset |
//!
//! # Examples
//!
//! ```bash
//! FEEDGATE_FX_URL='https://api.example.com/fx?symbols={symbols}&apikey={apikey}' \
//!   feedgate fetch fx --pretty
//!
//! feedgate schedule --at 2024-01-01T10:10:00Z
//! ```

use clap::{Args, Parser, Subcommand};
use feedgate_core::{FeedKind, UtcDateTime};

/// Resilient pull-based market and weather feeds.
#[derive(Debug, Parser)]
#[command(
    name = "feedgate",
    author,
    version,
    about = "Resilient pull-based market and weather feeds",
    long_about = "feedgate fronts rate-limited upstream APIs with a cache, request \
coalescing, per-provider circuit breakers, shared call budgets and on-disk snapshots.\n\
\n\
Feeds are configured through FEEDGATE_* environment variables."
)]
pub struct Cli {
    /// Pretty-print JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Default log filter, overridden by FEEDGATE_LOG or RUST_LOG.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve one feed and print its response envelope.
    Fetch(FetchArgs),

    /// Print budgets, circuit states and per-feed cache diagnostics.
    Trace,

    /// Show the next refresh slot of every configured feed.
    Schedule(ScheduleArgs),

    /// Run background refresh loops and print diagnostics periodically.
    Watch(WatchArgs),
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Feed to serve (fx, crypto, commodities, indices, weather).
    #[arg(value_parser = parse_feed)]
    pub feed: FeedKind,

    /// Seed the cache from the last snapshot before serving.
    #[arg(long, default_value_t = false)]
    pub prewarm: bool,
}

#[derive(Debug, Args)]
pub struct ScheduleArgs {
    /// Reference instant (RFC 3339, UTC). Defaults to now.
    #[arg(long, value_parser = parse_instant)]
    pub at: Option<UtcDateTime>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Seconds between diagnostics reports.
    #[arg(long, default_value_t = 60)]
    pub every_secs: u64,

    /// Stop after this many reports. Runs until Ctrl-C when omitted.
    #[arg(long)]
    pub iterations: Option<u32>,
}

fn parse_feed(value: &str) -> Result<FeedKind, String> {
    value.parse::<FeedKind>().map_err(|error| error.to_string())
}

fn parse_instant(value: &str) -> Result<UtcDateTime, String> {
    UtcDateTime::parse(value).map_err(|error| error.to_string())
}
