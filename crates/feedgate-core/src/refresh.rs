//! Per-feed background refresh loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::handler::{Feed, RefreshOutcome};
use crate::FeedKind;

/// Handle to a running refresh loop. Dropping it without [`RefreshTask::stop`]
/// leaves the loop running until the runtime shuts down.
#[derive(Debug)]
pub struct RefreshTask {
    feed: FeedKind,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RefreshTask {
    /// Starts the loop: staggered startup keys first, then one refresh per slot.
    pub fn spawn(feed: Arc<dyn Feed>, clock: Arc<dyn Clock>) -> Self {
        let kind = feed.kind();
        let (stop, stopped) = watch::channel(false);
        let handle = tokio::spawn(run(feed, clock, stopped));
        Self {
            feed: kind,
            stop,
            handle,
        }
    }

    pub fn feed(&self) -> FeedKind {
        self.feed
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signals the loop and waits for it to exit. An upstream call already in
    /// flight keeps running for any other caller awaiting it.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(error) = self.handle.await {
            warn!(feed = %self.feed, error = %error, "refresh loop ended abnormally");
        }
    }
}

async fn run(feed: Arc<dyn Feed>, clock: Arc<dyn Clock>, mut stopped: watch::Receiver<bool>) {
    let kind = feed.kind();
    info!(feed = %kind, schedule = feed.scheduler().plan().label(), "refresh loop started");

    let mut elapsed = Duration::ZERO;
    let mut startup = feed.startup_keys();
    startup.sort_by_key(|(delay, _)| *delay);
    for (delay, key) in startup {
        if !pause(clock.as_ref(), delay.saturating_sub(elapsed), &mut stopped).await {
            info!(feed = %kind, "refresh loop stopped during startup");
            return;
        }
        elapsed = elapsed.max(delay);
        if !tick(feed.as_ref(), key, &mut stopped).await {
            return;
        }
    }

    loop {
        let wait = feed.scheduler().ms_until_next_slot(clock.now());
        if !pause(clock.as_ref(), Duration::from_millis(wait), &mut stopped).await {
            break;
        }
        let key = feed.slot_key(clock.now());
        if !tick(feed.as_ref(), key, &mut stopped).await {
            break;
        }
    }

    info!(feed = %kind, "refresh loop stopped");
}

/// Runs one refresh. Returns false when the loop was asked to stop.
async fn tick(
    feed: &dyn Feed,
    key: crate::feed_source::FeedKey,
    stopped: &mut watch::Receiver<bool>,
) -> bool {
    let kind = feed.kind();
    tokio::select! {
        outcome = feed.refresh(key) => {
            match outcome {
                RefreshOutcome::Refreshed { quotes } => debug!(feed = %kind, quotes, "background refresh done"),
                RefreshOutcome::Skipped(reason) => debug!(feed = %kind, reason = ?reason, "background refresh skipped"),
                RefreshOutcome::Failed(error) => warn!(feed = %kind, error = %error, "background refresh failed"),
            }
            true
        }
        _ = stopped.changed() => false,
    }
}

/// Sleeps on the injected clock. Returns false when the loop was asked to stop.
async fn pause(clock: &dyn Clock, duration: Duration, stopped: &mut watch::Receiver<bool>) -> bool {
    if *stopped.borrow() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        _ = clock.sleep(duration) => !*stopped.borrow(),
        _ = stopped.changed() => false,
    }
}
