//! Integration tests for the dispatcher poll loop.
//!
//! Verifies lease fan-out, per-event reporting, and the loop's behavior
//! when the store misbehaves or shutdown is requested.

use std::{sync::Arc, time::Duration};

use fluxpoint_core::{models::LeaseResponse, Clock, RealClock};
use fluxpoint_delivery::{
    ClientConfig, DeliveryEngine, Dispatcher, DispatcherConfig, RetrySchedule, StoreClient,
    StoreSettings, TargetClient,
};
use fluxpoint_testing::{LeasedEventBuilder, TestClock};
use tokio_util::sync::CancellationToken;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

fn dispatcher_with(
    store_uri: &str,
    config: DispatcherConfig,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) -> Dispatcher {
    let store = Arc::new(
        StoreClient::new(
            StoreSettings {
                base_url: store_uri.to_string(),
                token: None,
                worker_id: "w1".to_string(),
            },
            Arc::clone(&clock),
        )
        .expect("store client builds"),
    );
    let client = Arc::new(
        TargetClient::new(ClientConfig {
            request_timeout: Duration::from_secs(2),
            ..ClientConfig::default()
        })
        .expect("target client builds"),
    );
    let engine = Arc::new(DeliveryEngine::new(
        client,
        Arc::clone(&store),
        RetrySchedule { immediate_retry_max: 0, ..RetrySchedule::default() },
        10,
        Arc::clone(&clock),
        cancel.clone(),
    ));
    Dispatcher::new(store, engine, config, clock, cancel)
}

async fn mount_report_ok(store: &MockServer) {
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/internal/dispatcher/report"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "circuit": null
        })))
        .mount(store)
        .await;
}

#[tokio::test]
async fn run_once_reports_every_leased_event() {
    let store = MockServer::start().await;
    let target = MockServer::start().await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .expect(2)
        .mount(&target)
        .await;
    mount_report_ok(&store).await;

    let lease_body = LeaseResponse {
        events: vec![
            LeasedEventBuilder::new(format!("{}/hook", target.uri())).id("evt_a").build(),
            LeasedEventBuilder::new(format!("{}/hook", target.uri())).id("evt_b").build(),
        ],
    };
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/internal/dispatcher/lease"))
        .and(matchers::body_json(serde_json::json!({
            "limit": 10,
            "lease_ms": 30000,
            "worker_id": "w1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::to_value(&lease_body).unwrap()))
        .expect(1)
        .mount(&store)
        .await;

    let config = DispatcherConfig { batch_size: 10, concurrency: 4, ..DispatcherConfig::default() };
    let dispatcher = dispatcher_with(
        &store.uri(),
        config,
        Arc::new(TestClock::new()),
        CancellationToken::new(),
    );

    dispatcher.run_once().await;

    let stats = dispatcher.stats().await;
    assert_eq!(stats.busy_polls, 1);
    assert_eq!(stats.events_processed, 2);
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.report_failures, 0);

    let reports: Vec<serde_json::Value> = store
        .received_requests()
        .await
        .expect("recording enabled")
        .iter()
        .filter(|request| request.url.path() == "/internal/dispatcher/report")
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect();
    assert_eq!(reports.len(), 2, "exactly one report per leased event");

    let mut reported_ids: Vec<&str> =
        reports.iter().map(|report| report["event_id"].as_str().unwrap()).collect();
    reported_ids.sort_unstable();
    assert_eq!(reported_ids, vec!["evt_a", "evt_b"]);

    target.verify().await;
    store.verify().await;
}

#[tokio::test]
async fn empty_batch_is_a_quiet_cycle() {
    let store = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/internal/dispatcher/lease"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "events": []
        })))
        .expect(1)
        .mount(&store)
        .await;

    let dispatcher = dispatcher_with(
        &store.uri(),
        DispatcherConfig::default(),
        Arc::new(TestClock::new()),
        CancellationToken::new(),
    );

    dispatcher.run_once().await;

    let stats = dispatcher.stats().await;
    assert_eq!(stats.busy_polls, 0);
    assert_eq!(stats.events_processed, 0);

    store.verify().await;
}

#[tokio::test]
async fn lease_failure_is_absorbed() {
    let store = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/internal/dispatcher/lease"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": "validation",
            "message": "bad limit"
        })))
        .mount(&store)
        .await;

    let dispatcher = dispatcher_with(
        &store.uri(),
        DispatcherConfig::default(),
        Arc::new(TestClock::new()),
        CancellationToken::new(),
    );

    // Must not panic or propagate; the loop simply tries again next poll.
    dispatcher.run_once().await;
    dispatcher.run_once().await;

    let stats = dispatcher.stats().await;
    assert_eq!(stats.events_processed, 0);

    let requests = store.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn run_loop_stops_on_cancellation() {
    let store = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/internal/dispatcher/lease"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "events": []
        })))
        .mount(&store)
        .await;

    let cancel = CancellationToken::new();
    let config = DispatcherConfig {
        poll_interval: Duration::from_millis(10),
        ..DispatcherConfig::default()
    };
    let dispatcher =
        dispatcher_with(&store.uri(), config, Arc::new(RealClock::new()), cancel.clone());

    let handle = tokio::spawn(async move { dispatcher.run().await });

    // Let a few cycles run, then request shutdown.
    tokio::time::sleep(Duration::from_millis(60)).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("dispatcher must stop promptly after cancellation")
        .expect("dispatcher task must not panic");

    let polls = store.received_requests().await.expect("recording enabled").len();
    assert!(polls >= 1, "loop should have polled at least once before cancellation");
}

#[tokio::test]
async fn pre_cancelled_dispatcher_does_not_poll() {
    let store = MockServer::start().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let dispatcher = dispatcher_with(
        &store.uri(),
        DispatcherConfig::default(),
        Arc::new(TestClock::new()),
        cancel,
    );

    dispatcher.run().await;

    let requests = store.received_requests().await.expect("recording enabled");
    assert!(requests.is_empty(), "cancelled dispatcher must not lease");
}
