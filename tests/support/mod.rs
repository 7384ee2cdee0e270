#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use feedgate_core::{
    FeedError, FeedKey, FeedSource, ManualClock, ProviderId, RawPayload, UtcDateTime,
};
use serde_json::{json, Value};
use tokio::sync::Notify;

/// One scripted upstream response.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(Value),
    Fail(FeedError),
    /// Never completes; exercises the fetch timeout.
    Hang,
    /// Panics inside the adapter future.
    Panic,
}

/// Upstream double that replays a script, then repeats its fallback step.
#[derive(Debug)]
pub struct ScriptedSource {
    provider: ProviderId,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicUsize,
    keys: Mutex<Vec<FeedKey>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedSource {
    pub fn new(provider: &str, fallback: Step) -> Self {
        Self {
            provider: ProviderId::parse(provider).expect("valid provider"),
            script: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn responding(provider: &str, payload: Value) -> Self {
        Self::new(provider, Step::Respond(payload))
    }

    pub fn failing(provider: &str) -> Self {
        Self::new(
            provider,
            Step::Fail(FeedError::http(provider, Some(503), "service unavailable")),
        )
    }

    pub fn then(self, step: Step) -> Self {
        self.script
            .lock()
            .expect("script lock is not poisoned")
            .push_back(step);
        self
    }

    /// Holds every fetch until the gate is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<FeedKey> {
        self.keys.lock().expect("keys lock is not poisoned").clone()
    }
}

impl FeedSource for ScriptedSource {
    fn provider(&self) -> &ProviderId {
        &self.provider
    }

    fn fetch<'a>(
        &'a self,
        key: &'a FeedKey,
    ) -> Pin<Box<dyn Future<Output = Result<RawPayload, FeedError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keys
            .lock()
            .expect("keys lock is not poisoned")
            .push(key.clone());
        let step = self
            .script
            .lock()
            .expect("script lock is not poisoned")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        Box::pin(async move {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match step {
                Step::Respond(value) => Ok(RawPayload::new(value)),
                Step::Fail(error) => Err(error),
                Step::Hang => std::future::pending().await,
                Step::Panic => panic!("adapter crashed"),
            }
        })
    }
}

pub fn fx_payload(rate: f64) -> Value {
    json!({
        "quotes": [
            { "pair": "EUR/USD", "rate": rate },
            { "pair": "GBP/USD", "rate": 1.27 }
        ]
    })
}

pub fn commodity_payload(symbols: &[&str]) -> Value {
    let quotes: Vec<Value> = symbols
        .iter()
        .map(|symbol| json!({ "symbol": symbol, "price": 10.0 }))
        .collect();
    json!({ "quotes": quotes })
}

pub fn at(timestamp: &str) -> UtcDateTime {
    UtcDateTime::parse(timestamp).expect("valid timestamp")
}

pub fn manual_clock(timestamp: &str) -> Arc<ManualClock> {
    Arc::new(ManualClock::new(at(timestamp)))
}

/// Yields until `condition` holds, failing after a bounded number of polls.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..2_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("timed out waiting for {what}");
}

/// Lets spawned tasks run without moving the clock.
pub async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(50);
