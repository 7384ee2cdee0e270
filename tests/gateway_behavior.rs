mod support;

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use feedgate_core::{
    FeedGateway, FeedKind, GatewayConfig, GatewayError, HttpClient, HttpError, HttpRequest,
    HttpResponse, ManualClock, ProviderId, StaticCredentials,
};
use serde_json::json;

use support::{fx_payload, manual_clock, ScriptedSource};

fn config(home: &Path, overrides: &[(&str, &str)]) -> GatewayConfig {
    let mut vars: HashMap<String, String> = HashMap::from([
        (String::from("FEEDGATE_HOME"), home.display().to_string()),
        (String::from("FEEDGATE_BUILD_ID"), String::from("test-build")),
        (String::from("FEEDGATE_RETRY_COUNT"), String::from("0")),
    ]);
    for (key, value) in overrides {
        vars.insert((*key).to_owned(), (*value).to_owned());
    }
    GatewayConfig::from_lookup(move |key| vars.get(key).cloned()).expect("valid config")
}

fn indices_payload() -> serde_json::Value {
    json!({ "quotes": [{ "symbol": "SPX", "value": 4700.5 }, { "symbol": "NDX", "value": 16800.0 }] })
}

fn market_gateway(
    home: &Path,
    clock: &Arc<ManualClock>,
    fx: &Arc<ScriptedSource>,
    indices: &Arc<ScriptedSource>,
    overrides: &[(&str, &str)],
) -> FeedGateway {
    FeedGateway::builder(config(home, overrides))
        .with_clock(clock.clone())
        .with_source(FeedKind::Fx, fx.clone())
        .with_source(FeedKind::Indices, indices.clone())
        .build()
        .expect("gateway")
}

#[tokio::test]
async fn only_feeds_with_a_source_are_served() {
    let home = tempfile::tempdir().expect("temp dir");
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let fx = Arc::new(ScriptedSource::responding("twelvedata", fx_payload(1.08)));
    let indices = Arc::new(ScriptedSource::responding("twelvedata", indices_payload()));
    let gateway = market_gateway(home.path(), &clock, &fx, &indices, &[]);

    assert_eq!(gateway.feeds(), [FeedKind::Fx, FeedKind::Indices]);

    let envelope = gateway.get(FeedKind::Fx).await.expect("fx envelope");
    assert_eq!(envelope["meta"]["mode"], "live");
    assert_eq!(envelope["meta"]["buildId"], "test-build");

    let error = gateway.get(FeedKind::Weather).await.expect_err("weather is not configured");
    assert!(matches!(error, GatewayError::UnknownFeed { feed: FeedKind::Weather }));
    assert_eq!(error.to_string(), "feed 'weather' is not configured");
}

#[tokio::test]
async fn feeds_on_the_same_account_share_one_budget() {
    let home = tempfile::tempdir().expect("temp dir");
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let fx = Arc::new(ScriptedSource::responding("twelvedata", fx_payload(1.08)));
    let indices = Arc::new(ScriptedSource::responding("twelvedata", indices_payload()));
    let gateway = market_gateway(
        home.path(),
        &clock,
        &fx,
        &indices,
        &[("FEEDGATE_TWELVEDATA_LIMIT", "2"), ("FEEDGATE_TWELVEDATA_WINDOW", "minute")],
    );

    assert_eq!(gateway.get(FeedKind::Fx).await.expect("fx")["meta"]["mode"], "live");
    assert_eq!(gateway.get(FeedKind::Indices).await.expect("indices")["meta"]["mode"], "live");

    let blocked = gateway.get(FeedKind::Fx).await.expect("fx");
    assert_eq!(blocked["meta"]["mode"], "cached");
    assert_eq!(blocked["meta"]["reason"], "budget_exhausted");
    assert_eq!(blocked["meta"]["budget"]["state"], "blocked");

    let budget = gateway.budget("twelvedata").expect("shared account");
    assert_eq!(budget.snapshot().used, 2);
    assert_eq!(fx.calls() + indices.calls(), 2);
}

#[tokio::test]
async fn feeds_from_the_same_provider_share_one_circuit() {
    let home = tempfile::tempdir().expect("temp dir");
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let fx = Arc::new(ScriptedSource::failing("twelvedata"));
    let indices = Arc::new(ScriptedSource::responding("twelvedata", indices_payload()));
    let gateway = market_gateway(
        home.path(),
        &clock,
        &fx,
        &indices,
        &[("FEEDGATE_CIRCUIT_THRESHOLD", "1")],
    );

    let failed = gateway.get(FeedKind::Fx).await.expect("fx");
    assert_eq!(failed["meta"]["mode"], "fallback");
    assert_eq!(failed["meta"]["reason"], "no_data");
    assert_eq!(failed["data"]["quotes"], json!([]));

    let provider = ProviderId::parse("twelvedata").expect("provider");
    let breaker = gateway.breaker(&provider).expect("shared breaker");
    assert_eq!(breaker.snapshot().state, feedgate_core::CircuitState::Open);

    gateway.get(FeedKind::Indices).await.expect("indices");
    assert_eq!(indices.calls(), 0, "open circuit covers every feed of the provider");
}

#[tokio::test]
async fn trace_reports_budgets_circuits_and_caches() {
    let home = tempfile::tempdir().expect("temp dir");
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let fx = Arc::new(ScriptedSource::responding("twelvedata", fx_payload(1.08)));
    let indices = Arc::new(ScriptedSource::responding("twelvedata", indices_payload()));
    let gateway = market_gateway(home.path(), &clock, &fx, &indices, &[]);

    gateway.get(FeedKind::Fx).await.expect("fx");
    let report = gateway.trace();
    assert_eq!(report.build_id, "test-build");
    assert_eq!(report.budgets.len(), 1);
    assert_eq!(report.budgets[0].account, "twelvedata");
    assert_eq!(report.budgets[0].limit, 800);
    assert_eq!(report.circuits.len(), 1);
    assert_eq!(report.feeds.len(), 2);

    let json = serde_json::to_value(&report).expect("trace json");
    assert_eq!(json["generatedAt"], "2024-01-01T10:10:00Z");
    assert_eq!(json["feeds"][0]["feed"], "fx");
    assert_eq!(json["feeds"][0]["cache"]["origin"], "live");
    assert_eq!(json["feeds"][0]["nextSlotAt"], "2024-01-01T10:30:00Z");
    assert_eq!(json["feeds"][1]["cache"], serde_json::Value::Null);
    assert_eq!(json["circuits"][0]["state"], "closed");
}

#[tokio::test]
async fn schedule_previews_the_next_slot_per_feed() {
    let home = tempfile::tempdir().expect("temp dir");
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let fx = Arc::new(ScriptedSource::responding("twelvedata", fx_payload(1.08)));
    let indices = Arc::new(ScriptedSource::responding("twelvedata", indices_payload()));
    let gateway = market_gateway(home.path(), &clock, &fx, &indices, &[]);

    let previews = gateway.schedule(support::at("2024-01-01T10:10:00Z"));
    assert_eq!(previews.len(), 2);
    assert_eq!(previews[0].feed, FeedKind::Fx);
    assert_eq!(previews[0].schedule, "clock_aligned");
    assert_eq!(previews[0].ms_until, 20 * 60_000);
    assert_eq!(previews[1].feed, FeedKind::Indices);
    assert_eq!(previews[1].next_slot_at, support::at("2024-01-01T10:35:00Z"));
}

#[tokio::test]
async fn snapshots_persist_under_home_and_prewarm_a_new_gateway() {
    let home = tempfile::tempdir().expect("temp dir");
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let fx = Arc::new(ScriptedSource::responding("twelvedata", fx_payload(1.08)));
    let indices = Arc::new(ScriptedSource::responding("twelvedata", indices_payload()));
    let gateway = market_gateway(home.path(), &clock, &fx, &indices, &[]);

    gateway.get(FeedKind::Fx).await.expect("fx");
    assert!(home.path().join("snapshots").join("fx.json").exists());
    assert!(!home.path().join("snapshots").join("indices.json").exists());

    let down = Arc::new(ScriptedSource::failing("twelvedata"));
    let restarted = market_gateway(home.path(), &clock, &down, &down, &[]);
    assert_eq!(restarted.prewarm_all().await, 1);

    let envelope = restarted.get(FeedKind::Fx).await.expect("fx");
    assert_eq!(envelope["meta"]["mode"], "fallback");
    assert_eq!(envelope["meta"]["reason"], "upstream_failed");
    assert_eq!(envelope["data"]["quotes"][0]["rate"], 1.08);
}

#[tokio::test]
async fn background_loops_start_once_and_stop_on_shutdown() {
    let home = tempfile::tempdir().expect("temp dir");
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let fx = Arc::new(ScriptedSource::responding("twelvedata", fx_payload(1.08)));
    let indices = Arc::new(ScriptedSource::responding("twelvedata", indices_payload()));
    let gateway = FeedGateway::builder(config(home.path(), &[]))
        .with_clock(clock.clone())
        .with_source(FeedKind::Fx, fx.clone())
        .with_source(FeedKind::Indices, indices.clone())
        .in_memory_snapshots()
        .build()
        .expect("gateway");

    gateway.start_background().await;
    gateway.start_background().await;
    assert_eq!(gateway.running_tasks().await, 2);

    support::eventually("startup refreshes", || fx.calls() == 1 && indices.calls() == 1).await;

    gateway.shutdown().await;
    assert_eq!(gateway.running_tasks().await, 0);
    assert!(!home.path().join("snapshots").exists(), "in-memory snapshots");
}

#[derive(Debug, Default)]
struct CannedClient {
    requests: Mutex<Vec<HttpRequest>>,
}

impl HttpClient for CannedClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.requests.lock().expect("requests lock").push(request);
        Box::pin(async {
            Ok(HttpResponse::ok_json(
                r#"{"data":[{"symbol":"BTC","price":42000.0},{"symbol":"ETH","price":null}]}"#,
            ))
        })
    }
}

#[tokio::test]
async fn configured_url_builds_an_http_source() {
    let home = tempfile::tempdir().expect("temp dir");
    let clock = manual_clock("2024-01-01T10:10:00Z");
    let client = Arc::new(CannedClient::default());
    let credentials = StaticCredentials::new()
        .with_key(ProviderId::parse("coingecko").expect("provider"), "secret");

    let gateway = FeedGateway::builder(config(
        home.path(),
        &[
            ("FEEDGATE_CRYPTO_URL", "https://api.example.test/prices?ids={symbols}&key={apikey}"),
            ("FEEDGATE_CRYPTO_QUOTES_POINTER", "/data"),
            ("FEEDGATE_CRYPTO_SYMBOLS", "btc,eth"),
        ],
    ))
    .with_clock(clock.clone())
    .with_http_client(client.clone())
    .with_credentials(Arc::new(credentials))
    .in_memory_snapshots()
    .build()
    .expect("gateway");

    assert_eq!(gateway.feeds(), [FeedKind::Crypto]);
    let envelope = gateway.get(FeedKind::Crypto).await.expect("crypto");
    assert_eq!(envelope["meta"]["mode"], "live");
    assert_eq!(envelope["meta"]["sourceProvider"], "coingecko");
    assert_eq!(envelope["data"]["quotes"][1]["price"], serde_json::Value::Null);

    let requests = client.requests.lock().expect("requests lock");
    assert_eq!(requests.len(), 1);
    assert!(requests[0].url.starts_with("https://api.example.test/prices?ids=BTC"));
    assert!(requests[0].url.ends_with("&key=secret"));
}
