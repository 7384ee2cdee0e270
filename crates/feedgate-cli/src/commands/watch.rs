use std::process::ExitCode;
use std::time::Duration;

use tracing::info;

use crate::cli::WatchArgs;
use crate::error::CliError;
use crate::output;

pub async fn run(args: &WatchArgs, pretty: bool) -> Result<ExitCode, CliError> {
    if args.every_secs == 0 {
        return Err(CliError::Command(String::from(
            "--every-secs must be greater than zero",
        )));
    }

    let gateway = super::build_gateway()?;
    if gateway.feeds().is_empty() {
        return Err(CliError::Command(String::from(
            "no feeds configured; set FEEDGATE_<FEED>_URL",
        )));
    }

    let seeded = gateway.prewarm_all().await;
    info!(seeded, "caches seeded from snapshots");
    gateway.start_background().await;

    let mut interval = tokio::time::interval(Duration::from_secs(args.every_secs));
    interval.tick().await;
    let mut reports = 0u32;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                output::render(&gateway.trace(), pretty)?;
                reports += 1;
                if args.iterations.is_some_and(|limit| reports >= limit) {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("interrupt received");
                break;
            }
        }
    }

    gateway.shutdown().await;
    Ok(ExitCode::SUCCESS)
}
