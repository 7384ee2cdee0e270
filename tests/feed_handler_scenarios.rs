mod support;

use std::sync::Arc;
use std::time::Duration;

use feedgate_core::{
    BudgetConfig, BudgetManager, BudgetStatus, BudgetWindow, CacheOrigin, CircuitState,
    DegradeReason, FeedConfig, FeedHandler, FeedKind, FxQuote, ManualClock, RetryPolicy,
    ServeMode, SsotSnapshot,
};
use serde_json::json;
use tokio::sync::Notify;

use support::{at, eventually, fx_payload, manual_clock, settle, ScriptedSource, Step, SHORT_TIMEOUT};

fn fx_config() -> FeedConfig {
    let mut config = FeedConfig::for_kind(FeedKind::Fx);
    config.retry = RetryPolicy::none();
    config.fetch_timeout = Duration::from_secs(5);
    config
}

fn fx_handler(source: &Arc<ScriptedSource>, clock: &Arc<ManualClock>) -> FeedHandler<FxQuote> {
    FeedHandler::builder(fx_config(), source.clone(), clock.clone())
        .build()
        .expect("fx handler")
}

fn budgeted_handler(
    source: &Arc<ScriptedSource>,
    clock: &Arc<ManualClock>,
    limit: u32,
) -> FeedHandler<FxQuote> {
    let budget = BudgetManager::new(
        "twelvedata",
        BudgetConfig::new(limit, BudgetWindow::Minute),
        clock.clone(),
    );
    FeedHandler::builder(fx_config(), source.clone(), clock.clone())
        .budget(Arc::new(budget))
        .build()
        .expect("fx handler")
}

#[tokio::test]
async fn first_call_is_live_then_cached_until_next_slot() {
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let source = Arc::new(ScriptedSource::responding("twelvedata", fx_payload(1.08)));
    let handler = fx_handler(&source, &clock);

    let first = handler.get_data().await;
    assert_eq!(first.meta.mode, ServeMode::Live);
    assert_eq!(first.meta.age_ms, Some(0));
    assert_eq!(first.meta.source_provider, "twelvedata");
    assert_eq!(first.data.len(), 2);

    clock.advance(Duration::from_secs(300));
    let second = handler.get_data().await;
    assert_eq!(second.meta.mode, ServeMode::Cached);
    assert_eq!(second.meta.age_ms, Some(300_000));
    assert_eq!(second.meta.reason, None);
    assert_eq!(second.data, first.data);
    assert_ne!(second.meta.request_id, first.meta.request_id);
    assert_eq!(source.calls(), 1);

    clock.set(at("2024-01-01T10:30:00Z"));
    let third = handler.get_data().await;
    assert_eq!(third.meta.mode, ServeMode::Live);
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn repeated_failures_open_the_circuit_and_stop_upstream_calls() {
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let source = Arc::new(
        ScriptedSource::failing("twelvedata").then(Step::Respond(fx_payload(1.08))),
    );
    let handler = fx_handler(&source, &clock);

    assert!(handler.get_data().await.is_live());

    clock.set(at("2024-01-01T10:30:00Z"));
    for attempt in 1..=5 {
        let envelope = handler.get_data().await;
        assert_eq!(envelope.meta.mode, ServeMode::Cached, "attempt {attempt}");
        assert_eq!(envelope.meta.reason, Some(DegradeReason::UpstreamFailed));
        assert_eq!(envelope.data.len(), 2);
    }
    assert_eq!(source.calls(), 6);
    assert_eq!(handler.breaker().state(), CircuitState::Open);

    let blocked = handler.get_data().await;
    assert_eq!(blocked.meta.mode, ServeMode::Cached);
    assert_eq!(blocked.meta.reason, Some(DegradeReason::CircuitOpen));
    assert_eq!(source.calls(), 6, "open circuit makes no upstream call");

    clock.advance(Duration::from_secs(300));
    let trial = handler.get_data().await;
    assert_eq!(trial.meta.reason, Some(DegradeReason::UpstreamFailed));
    assert_eq!(source.calls(), 7, "one trial call after the reset timeout");
    assert_eq!(handler.breaker().state(), CircuitState::Open);
}

#[tokio::test]
async fn half_open_trial_success_closes_the_circuit() {
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let failure = Step::Fail(feedgate_core::FeedError::http("twelvedata", Some(500), "boom"));
    let mut source = ScriptedSource::responding("twelvedata", fx_payload(1.09));
    for _ in 0..5 {
        source = source.then(failure.clone());
    }
    let source = Arc::new(source);
    let handler = fx_handler(&source, &clock);

    for _ in 0..5 {
        assert!(!handler.get_data().await.is_live());
    }
    assert_eq!(handler.breaker().state(), CircuitState::Open);

    clock.advance(Duration::from_secs(301));
    let recovered = handler.get_data().await;
    assert!(recovered.is_live());
    assert_eq!(handler.breaker().state(), CircuitState::Closed);
    assert_eq!(handler.breaker().failure_count(), 0);
}

#[tokio::test]
async fn panicking_half_open_trial_reopens_the_circuit() {
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let failure = Step::Fail(feedgate_core::FeedError::http("twelvedata", Some(503), "unavailable"));
    let mut source = ScriptedSource::responding("twelvedata", fx_payload(1.09));
    for _ in 0..5 {
        source = source.then(failure.clone());
    }
    let source = Arc::new(source.then(Step::Panic));
    let handler = fx_handler(&source, &clock);

    for _ in 0..5 {
        handler.get_data().await;
    }
    assert_eq!(handler.breaker().state(), CircuitState::Open);

    clock.advance(Duration::from_secs(301));
    let crashed = handler.get_data().await;
    assert_eq!(crashed.meta.reason, Some(DegradeReason::UpstreamFailed));
    assert_eq!(handler.breaker().state(), CircuitState::Open);
    assert_eq!(source.calls(), 6);

    clock.advance(Duration::from_secs(301));
    assert!(handler.get_data().await.is_live());
    assert_eq!(handler.breaker().state(), CircuitState::Closed);
    assert_eq!(source.calls(), 7);
}

#[tokio::test]
async fn exhausted_budget_blocks_live_responses() {
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let source = Arc::new(ScriptedSource::responding("twelvedata", fx_payload(1.08)));
    let handler = budgeted_handler(&source, &clock, 3);

    let first = handler.get_data().await;
    assert_eq!(first.meta.mode, ServeMode::Live);
    assert_eq!(handler.get_data().await.meta.mode, ServeMode::Cached);
    assert_eq!(handler.get_data().await.meta.mode, ServeMode::Cached);

    let fourth = handler.get_data().await;
    assert_ne!(fourth.meta.mode, ServeMode::Live);
    assert_eq!(fourth.meta.reason, Some(DegradeReason::BudgetExhausted));
    let budget = fourth.meta.budget.expect("budget meta");
    assert_eq!(budget.state, BudgetStatus::Blocked);
    assert_eq!(budget.used, 3);
    assert_eq!(budget.limit, 3);
    assert_eq!(source.calls(), 1);
    assert_eq!(handler.budget().snapshot().used, 3, "denial does not consume");

    clock.advance(Duration::from_secs(60));
    let next_window = handler.get_data().await;
    assert_eq!(next_window.meta.reason, None);
    assert_eq!(handler.budget().snapshot().used, 1);
}

#[tokio::test]
async fn concurrent_callers_share_one_upstream_call() {
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let gate = Arc::new(Notify::new());
    let source = Arc::new(
        ScriptedSource::responding("twelvedata", fx_payload(1.08)).gated(gate.clone()),
    );
    let handler = fx_handler(&source, &clock);

    let callers: Vec<_> = (0..5)
        .map(|_| {
            let handler = handler.clone();
            tokio::spawn(async move { handler.get_data().await })
        })
        .collect();

    eventually("the upstream call to start", || source.calls() == 1).await;
    settle().await;
    assert_eq!(source.calls(), 1);
    assert_eq!(handler.trace().in_flight, 1);

    gate.notify_one();
    let mut envelopes = Vec::new();
    for caller in callers {
        envelopes.push(caller.await.expect("caller task"));
    }

    assert_eq!(source.calls(), 1);
    for envelope in &envelopes {
        assert_eq!(envelope.meta.mode, ServeMode::Live);
        assert_eq!(envelope.data, envelopes[0].data);
    }
    assert_eq!(handler.trace().in_flight, 0);
}

#[tokio::test]
async fn timeout_counts_as_failure() {
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let source = Arc::new(ScriptedSource::new("twelvedata", Step::Hang));
    let mut config = fx_config();
    config.fetch_timeout = SHORT_TIMEOUT;
    let handler: FeedHandler<FxQuote> = FeedHandler::builder(config, source.clone(), clock.clone())
        .build()
        .expect("fx handler");

    let envelope = handler.get_data().await;
    assert_eq!(envelope.meta.mode, ServeMode::Fallback);
    assert_eq!(envelope.meta.reason, Some(DegradeReason::NoData));
    assert!(envelope.data.is_empty());
    assert_eq!(handler.breaker().failure_count(), 1);
}

#[tokio::test]
async fn invalid_payload_is_never_cached() {
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let source = Arc::new(
        ScriptedSource::responding("twelvedata", fx_payload(1.08))
            .then(Step::Respond(json!({ "quotes": [{ "pair": "EUR/USD", "rate": -1.0 }] })))
            .then(Step::Respond(json!({ "status": "error" }))),
    );
    let handler = fx_handler(&source, &clock);

    for _ in 0..2 {
        let rejected = handler.get_data().await;
        assert_eq!(rejected.meta.mode, ServeMode::Fallback);
        assert!(rejected.data.is_empty());
        assert!(handler.trace().cache.is_none());
    }
    assert_eq!(handler.breaker().failure_count(), 2);

    let accepted = handler.get_data().await;
    assert!(accepted.is_live());
    assert_eq!(handler.breaker().failure_count(), 0);
    assert_eq!(source.calls(), 3);
}

#[tokio::test]
async fn snapshot_serves_after_restart_when_upstream_is_down() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("snapshots").join("fx.json");
    let clock = manual_clock("2024-01-01T10:10:00Z");

    let healthy = Arc::new(ScriptedSource::responding("twelvedata", fx_payload(1.08)));
    let before: FeedHandler<FxQuote> = FeedHandler::builder(fx_config(), healthy.clone(), clock.clone())
        .snapshot(Arc::new(SsotSnapshot::new(&path, clock.clone())))
        .build()
        .expect("fx handler");
    let live = before.get_data().await;
    assert!(live.is_live());
    assert!(path.exists());

    clock.advance(Duration::from_secs(600));
    let down = Arc::new(ScriptedSource::failing("twelvedata"));
    let after: FeedHandler<FxQuote> = FeedHandler::builder(fx_config(), down.clone(), clock.clone())
        .snapshot(Arc::new(SsotSnapshot::new(&path, clock.clone())))
        .build()
        .expect("fx handler");

    let fallback = after.get_data().await;
    assert_eq!(fallback.meta.mode, ServeMode::Fallback);
    assert_eq!(fallback.meta.reason, Some(DegradeReason::UpstreamFailed));
    assert_eq!(fallback.meta.age_ms, Some(600_000));
    assert_eq!(fallback.data, live.data);
    assert_eq!(down.calls(), 1);
}

#[tokio::test]
async fn prewarmed_cache_is_marked_as_snapshot_and_refetched() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("fx.json");
    let clock = manual_clock("2024-01-01T10:10:00Z");

    let first = Arc::new(ScriptedSource::responding("twelvedata", fx_payload(1.08)));
    let seeding: FeedHandler<FxQuote> = FeedHandler::builder(fx_config(), first, clock.clone())
        .snapshot(Arc::new(SsotSnapshot::new(&path, clock.clone())))
        .build()
        .expect("fx handler");
    seeding.get_data().await;

    let second = Arc::new(ScriptedSource::responding("twelvedata", fx_payload(1.10)));
    let restarted: FeedHandler<FxQuote> = FeedHandler::builder(fx_config(), second.clone(), clock.clone())
        .snapshot(Arc::new(SsotSnapshot::new(&path, clock.clone())))
        .build()
        .expect("fx handler");

    assert!(restarted.prewarm().await);
    assert!(!restarted.prewarm().await, "only an empty cache is seeded");
    let cache = restarted.trace().cache.expect("prewarmed cache");
    assert_eq!(cache.origin, CacheOrigin::Snapshot);
    assert_eq!(cache.fetched_at, at("2024-01-01T10:10:00Z"));

    let envelope = restarted.get_data().await;
    assert!(envelope.is_live(), "snapshot data does not count as fresh");
    assert_eq!(envelope.data.quotes[0].rate, 1.10);
    assert_eq!(second.calls(), 1);
}

#[tokio::test]
async fn total_failure_serves_empty_payload() {
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let source = Arc::new(ScriptedSource::failing("twelvedata"));
    let handler = fx_handler(&source, &clock);

    let envelope = handler.get_data().await;
    assert_eq!(envelope.meta.mode, ServeMode::Fallback);
    assert_eq!(envelope.meta.reason, Some(DegradeReason::NoData));
    assert_eq!(envelope.meta.age_ms, None);
    assert!(envelope.data.is_empty());
    assert_eq!(envelope.meta.feed, FeedKind::Fx);
}

#[tokio::test]
async fn retry_waits_on_the_clock_and_pays_again() {
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let source = Arc::new(
        ScriptedSource::responding("twelvedata", fx_payload(1.08)).then(Step::Fail(
            feedgate_core::FeedError::http("twelvedata", Some(503), "busy"),
        )),
    );
    let mut config = fx_config();
    config.retry = RetryPolicy::fixed(1, Duration::from_secs(2));
    let handler: FeedHandler<FxQuote> = FeedHandler::builder(config, source.clone(), clock.clone())
        .build()
        .expect("fx handler");

    let caller = {
        let handler = handler.clone();
        tokio::spawn(async move { handler.get_data().await })
    };
    eventually("the first attempt", || source.calls() == 1).await;
    settle().await;
    assert_eq!(source.calls(), 1, "retry waits for the delay");

    clock.advance(Duration::from_secs(2));
    let envelope = caller.await.expect("caller task");
    assert!(envelope.is_live());
    assert_eq!(source.calls(), 2);
    assert_eq!(handler.budget().snapshot().used, 2);
    assert_eq!(handler.breaker().failure_count(), 0);
}

#[tokio::test]
async fn json_envelope_carries_meta_contract() {
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let source = Arc::new(ScriptedSource::responding("twelvedata", fx_payload(1.08)));
    let handler = fx_handler(&source, &clock);

    let value = feedgate_core::Feed::get_json(&handler).await.expect("json envelope");
    assert_eq!(value["meta"]["mode"], "live");
    assert_eq!(value["meta"]["sourceProvider"], "twelvedata");
    assert_eq!(value["meta"]["feed"], "fx");
    assert_eq!(value["meta"]["generatedAt"], "2024-01-01T10:10:00Z");
    assert_eq!(value["data"]["quotes"][0]["pair"], "EUR/USD");
    assert!(value["meta"]["requestId"].as_str().is_some_and(|id| !id.is_empty()));
}
