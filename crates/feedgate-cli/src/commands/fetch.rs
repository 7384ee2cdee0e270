use std::process::ExitCode;

use serde_json::Value;
use tracing::debug;

use crate::cli::FetchArgs;
use crate::error::CliError;
use crate::output;

/// Exit code when the feed was served but degraded.
const DEGRADED_EXIT: u8 = 3;

pub async fn run(args: &FetchArgs, pretty: bool) -> Result<ExitCode, CliError> {
    let gateway = super::build_gateway()?;
    if args.prewarm {
        let seeded = gateway.prewarm_all().await;
        debug!(seeded, "caches seeded from snapshots");
    }

    let envelope = gateway.get(args.feed).await?;
    output::render(&envelope, pretty)?;

    if is_degraded(&envelope) {
        Ok(ExitCode::from(DEGRADED_EXIT))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Anything other than a `live` or `cached` mode counts as degraded.
fn is_degraded(envelope: &Value) -> bool {
    let not_degraded = envelope
        .pointer("/meta/mode")
        .and_then(Value::as_str)
        .is_some_and(|mode| mode == "live" || mode == "cached");
    !not_degraded
}
