//! Integration tests for the per-event delivery pipeline.
//!
//! Drives the engine against mock servers standing in for both the store
//! and the target endpoint. The virtual clock makes backoff sleeps
//! instantaneous while preserving their scheduling behavior.

use std::{sync::Arc, time::Duration};

use fluxpoint_core::models::{LeasedEvent, ReportOutcome};
use fluxpoint_delivery::{
    ClientConfig, DeliveryEngine, DeliveryStatus, RetrySchedule, StoreClient, StoreSettings,
    TargetClient,
};
use fluxpoint_testing::{LeasedEventBuilder, TestClock};
use tokio_util::sync::CancellationToken;
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

struct Harness {
    store: MockServer,
    target: MockServer,
    engine: DeliveryEngine,
    cancel: CancellationToken,
    clock: TestClock,
}

async fn harness(
    schedule: RetrySchedule,
    max_attempts: u32,
    request_timeout: Duration,
) -> Harness {
    let store = MockServer::start().await;
    let target = MockServer::start().await;
    let clock = TestClock::new();
    let cancel = CancellationToken::new();

    let store_client = StoreClient::new(
        StoreSettings { base_url: store.uri(), token: None, worker_id: "w1".to_string() },
        Arc::new(clock.clone()),
    )
    .expect("store client builds");

    let target_client =
        TargetClient::new(ClientConfig { request_timeout, ..ClientConfig::default() })
            .expect("target client builds");

    let engine = DeliveryEngine::new(
        Arc::new(target_client),
        Arc::new(store_client),
        schedule,
        max_attempts,
        Arc::new(clock.clone()),
        cancel.clone(),
    );

    Harness { store, target, engine, cancel, clock }
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

async fn reports_received(store: &MockServer) -> Vec<serde_json::Value> {
    store
        .received_requests()
        .await
        .expect("request recording enabled")
        .iter()
        .filter(|request| request.url.path() == "/internal/dispatcher/report")
        .map(|request| serde_json::from_slice(&request.body).expect("report body is JSON"))
        .collect()
}

fn event(harness: &Harness) -> LeasedEvent {
    LeasedEventBuilder::new(format!("{}/hook", harness.target.uri())).build()
}

#[tokio::test]
async fn happy_path_reports_delivered() {
    let h = harness(RetrySchedule::default(), 10, Duration::from_secs(5)).await;
    mount_report_ok(&h.store).await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .expect(1)
        .mount(&h.target)
        .await;

    let leased = LeasedEventBuilder::new(format!("{}/hook", h.target.uri()))
        .id("e1")
        .payload(r#"{"ok":true}"#)
        .build();
    let expected_headers = serde_json::to_value(&leased.event.headers).unwrap();

    let status = h.engine.deliver(leased).await;
    assert_eq!(
        status,
        DeliveryStatus::Completed {
            outcome: ReportOutcome::Delivered,
            retryable: false,
            reported: true
        }
    );

    let reports = reports_received(&h.store).await;
    assert_eq!(reports.len(), 1, "exactly one report per delivery");

    let report = &reports[0];
    assert_eq!(report["worker_id"], "w1");
    assert_eq!(report["event_id"], "e1");
    assert_eq!(report["outcome"], "delivered");
    assert_eq!(report["retryable"], false);
    assert_eq!(report["next_attempt_at"], serde_json::Value::Null);

    let attempt = &report["attempt"];
    assert_eq!(attempt["request_headers"], expected_headers);
    assert_eq!(attempt["request_body"], r#"{"ok":true}"#);
    assert_eq!(attempt["response_status"], 200);
    assert_eq!(attempt["response_body"], "OK");
    assert_eq!(attempt["error_kind"], serde_json::Value::Null);
    assert_eq!(attempt["error_message"], serde_json::Value::Null);
    assert!(
        attempt["finished_at"].as_str().unwrap() >= attempt["started_at"].as_str().unwrap(),
        "finished_at must not precede started_at"
    );

    h.target.verify().await;
}

#[tokio::test]
async fn retryable_status_exhausts_in_process_retries() {
    let schedule = RetrySchedule { immediate_retry_max: 2, ..RetrySchedule::default() };
    let h = harness(schedule, 5, Duration::from_secs(5)).await;
    mount_report_ok(&h.store).await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&h.target)
        .await;

    let status = h.engine.deliver(event(&h)).await;
    assert_eq!(
        status,
        DeliveryStatus::Completed {
            outcome: ReportOutcome::Retry,
            retryable: true,
            reported: true
        }
    );

    let reports = reports_received(&h.store).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["outcome"], "retry");
    assert_eq!(reports[0]["retryable"], true);
    assert_eq!(reports[0]["attempt"]["response_status"], 500);

    // Both backoff pauses were scheduled: 1s and 2s of virtual time.
    assert!(h.clock.elapsed() >= Duration::from_millis(2400));
    assert!(h.clock.elapsed() <= Duration::from_millis(3600));

    h.target.verify().await;
}

#[tokio::test]
async fn retry_then_success_reports_delivered() {
    let schedule = RetrySchedule { immediate_retry_max: 2, ..RetrySchedule::default() };
    let h = harness(schedule, 10, Duration::from_secs(5)).await;
    mount_report_ok(&h.store).await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&h.target)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string("finally"))
        .expect(1)
        .mount(&h.target)
        .await;

    let status = h.engine.deliver(event(&h)).await;
    assert_eq!(
        status,
        DeliveryStatus::Completed {
            outcome: ReportOutcome::Delivered,
            retryable: false,
            reported: true
        }
    );

    let reports = reports_received(&h.store).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["outcome"], "delivered");
    assert_eq!(reports[0]["attempt"]["response_status"], 200);
    assert_eq!(reports[0]["attempt"]["response_body"], "finally");

    h.target.verify().await;
}

#[tokio::test]
async fn hard_status_resolves_immediately_without_retry() {
    let schedule = RetrySchedule { immediate_retry_max: 2, ..RetrySchedule::default() };
    let h = harness(schedule, 10, Duration::from_secs(5)).await;
    mount_report_ok(&h.store).await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .expect(1)
        .mount(&h.target)
        .await;

    let status = h.engine.deliver(event(&h)).await;
    assert_eq!(
        status,
        DeliveryStatus::Completed {
            outcome: ReportOutcome::Dead,
            retryable: false,
            reported: true
        }
    );

    let reports = reports_received(&h.store).await;
    assert_eq!(reports[0]["outcome"], "dead");
    assert_eq!(reports[0]["retryable"], false);
    assert_eq!(reports[0]["attempt"]["response_status"], 404);
    assert_eq!(h.clock.elapsed(), Duration::ZERO, "no backoff for terminal statuses");

    h.target.verify().await;
}

#[tokio::test]
async fn timeout_at_attempt_cap_is_dead_but_retryable() {
    let schedule = RetrySchedule { immediate_retry_max: 0, ..RetrySchedule::default() };
    let h = harness(schedule, 3, Duration::from_millis(100)).await;
    mount_report_ok(&h.store).await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&h.target)
        .await;

    let leased = LeasedEventBuilder::new(format!("{}/hook", h.target.uri()))
        .attempts(2)
        .build();

    let status = h.engine.deliver(leased).await;
    assert_eq!(
        status,
        DeliveryStatus::Completed {
            outcome: ReportOutcome::Dead,
            retryable: true,
            reported: true
        }
    );

    let reports = reports_received(&h.store).await;
    let attempt = &reports[0]["attempt"];
    assert_eq!(reports[0]["outcome"], "dead");
    assert_eq!(reports[0]["retryable"], true);
    assert_eq!(attempt["response_status"], serde_json::Value::Null);
    assert_eq!(attempt["response_headers"], serde_json::Value::Null);
    assert_eq!(attempt["response_body"], serde_json::Value::Null);
    assert_eq!(attempt["error_kind"], "timeout");
    assert_eq!(attempt["error_message"], "Request timed out");
}

#[tokio::test]
async fn report_failure_is_swallowed() {
    let h = harness(RetrySchedule::default(), 10, Duration::from_secs(5)).await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .expect(1)
        .mount(&h.target)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/internal/dispatcher/report"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "code": "internal",
            "message": "report pipeline down"
        })))
        .mount(&h.store)
        .await;

    let status = h.engine.deliver(event(&h)).await;
    assert_eq!(
        status,
        DeliveryStatus::Completed {
            outcome: ReportOutcome::Delivered,
            retryable: false,
            reported: false
        }
    );

    // Six submissions: the original plus five transient retries.
    let reports = reports_received(&h.store).await;
    assert_eq!(reports.len(), 6);
}

#[tokio::test]
async fn cancelled_delivery_never_reports() {
    let h = harness(RetrySchedule::default(), 10, Duration::from_secs(5)).await;
    mount_report_ok(&h.store).await;

    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&h.target)
        .await;

    h.cancel.cancel();
    let status = h.engine.deliver(event(&h)).await;
    assert_eq!(status, DeliveryStatus::Cancelled);

    let requests = h.store.received_requests().await.expect("recording enabled");
    assert!(requests.is_empty(), "cancelled deliveries must not report");
}
