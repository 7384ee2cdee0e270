//! Clock abstraction shared by caches, breakers, budgets and refresh loops.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;

use crate::UtcDateTime;

/// Source of wall-clock time and timer sleeps.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> UtcDateTime;

    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Real time backed by the system clock and tokio timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcDateTime {
        UtcDateTime::now()
    }

    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Simulated clock that only moves when told to.
///
/// Sleepers wake once [`ManualClock::advance`] or [`ManualClock::set`] moves the
/// time past their deadline.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<UtcDateTime>,
    ticks: Notify,
}

impl ManualClock {
    pub fn new(start: UtcDateTime) -> Self {
        Self {
            now: Mutex::new(start),
            ticks: Notify::new(),
        }
    }

    pub fn advance(&self, duration: Duration) {
        {
            let mut now = self.now.lock().expect("manual clock lock is not poisoned");
            *now = now.saturating_add(duration);
        }
        self.ticks.notify_waiters();
    }

    pub fn set(&self, value: UtcDateTime) {
        {
            let mut now = self.now.lock().expect("manual clock lock is not poisoned");
            *now = value;
        }
        self.ticks.notify_waiters();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UtcDateTime {
        *self.now.lock().expect("manual clock lock is not poisoned")
    }

    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        let deadline = self.now().saturating_add(duration);
        Box::pin(async move {
            loop {
                let notified = self.ticks.notified();
                tokio::pin!(notified);
                // Register before checking so an advance between the check and the
                // await is not lost.
                notified.as_mut().enable();
                if self.now() >= deadline {
                    return;
                }
                notified.await;
            }
        })
    }
}
