use std::process::ExitCode;

use feedgate_core::{FeedScheduler, GatewayConfig, SlotPreview, UtcDateTime};

use crate::cli::ScheduleArgs;
use crate::error::CliError;
use crate::output;

/// Previews slots from configuration alone, so feeds without an upstream URL
/// still show up.
pub fn run(args: &ScheduleArgs, pretty: bool) -> Result<ExitCode, CliError> {
    let config = GatewayConfig::from_env()?;
    let now = args.at.unwrap_or_else(UtcDateTime::now);

    let previews = previews(&config, now)?;
    output::render(&previews, pretty)?;
    Ok(ExitCode::SUCCESS)
}

fn previews(config: &GatewayConfig, now: UtcDateTime) -> Result<Vec<SlotPreview>, CliError> {
    config
        .feeds
        .iter()
        .map(|settings| -> Result<SlotPreview, CliError> {
            let scheduler = FeedScheduler::new(settings.feed.schedule.clone())?;
            Ok(SlotPreview {
                feed: settings.feed.kind,
                schedule: scheduler.plan().label(),
                next_slot_at: scheduler.next_slot_after(now),
                ms_until: scheduler.ms_until_next_slot(now),
            })
        })
        .collect()
}
