//! Per-event delivery pipeline.
//!
//! Runs the bounded attempt sequence for one leased event, assembles the
//! attempt record, classifies the final result, and submits the report.
//! Report failures are logged and swallowed: the delivery already reached
//! the target, and the store will re-lease the event when the unreported
//! lease expires. Cancellation at any suspension point unwinds without
//! reporting for the same reason.

use std::sync::Arc;

use fluxpoint_core::{
    format_timestamp,
    models::{AttemptRecord, LeasedEvent, ReportOutcome, ReportRequest},
    Clock,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    classify::{is_retryable_result, resolve_outcome, FinalAttempt},
    client::TargetClient,
    retry::RetrySchedule,
    store::StoreClient,
};

/// How one delivery ended, for dispatcher bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The attempt sequence finished and a report was assembled.
    Completed {
        /// Final classification sent (or attempted) to the store.
        outcome: ReportOutcome,
        /// Retryable flag sent alongside the outcome.
        retryable: bool,
        /// Whether the report reached the store.
        reported: bool,
    },
    /// Shutdown interrupted the delivery; the lease is left to expire.
    Cancelled,
}

/// Executes the delivery pipeline for single leased events.
///
/// All collaborators are injected so tests can drive the engine against
/// mock servers and a virtual clock.
pub struct DeliveryEngine {
    client: Arc<TargetClient>,
    store: Arc<StoreClient>,
    schedule: RetrySchedule,
    max_attempts: u32,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl DeliveryEngine {
    /// Creates an engine over the shared HTTP client and store client.
    pub fn new(
        client: Arc<TargetClient>,
        store: Arc<StoreClient>,
        schedule: RetrySchedule,
        max_attempts: u32,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> Self {
        Self { client, store, schedule, max_attempts, clock, cancel }
    }

    /// Delivers one leased event and reports the outcome.
    ///
    /// Returns [`DeliveryStatus::Cancelled`] when shutdown interrupts the
    /// delivery at a suspension point; nothing is reported in that case.
    pub async fn deliver(&self, leased: LeasedEvent) -> DeliveryStatus {
        let event_id = leased.event.id.clone();
        debug!(
            event_id = %event_id,
            target_url = %leased.target_url,
            attempts = leased.event.attempts,
            "starting delivery"
        );

        let started_at = format_timestamp(self.clock.now_utc());
        let Some(result) = self.attempt_sequence(&leased).await else {
            debug!(event_id = %event_id, "delivery cancelled, lease left to expire");
            return DeliveryStatus::Cancelled;
        };
        let finished_at = format_timestamp(self.clock.now_utc());

        let outcome = resolve_outcome(&result, leased.event.attempts, self.max_attempts);
        let retryable = is_retryable_result(&result);
        let attempt = build_attempt_record(&leased, started_at, finished_at, &result);

        let report = ReportRequest {
            worker_id: self.store.worker_id().to_string(),
            event_id: event_id.clone(),
            outcome,
            retryable,
            next_attempt_at: None,
            attempt,
        };

        let reported = tokio::select! {
            () = self.cancel.cancelled() => {
                debug!(event_id = %event_id, "cancelled before report, lease left to expire");
                return DeliveryStatus::Cancelled;
            }
            submitted = self.store.report(&report) => match submitted {
                Ok(response) => {
                    if let Some(circuit) = &response.circuit {
                        debug!(event_id = %event_id, circuit = %circuit, "store circuit state");
                    }
                    true
                },
                Err(store_error) => {
                    error!(
                        event_id = %event_id,
                        error = %store_error,
                        "report submission failed, store will re-lease on expiry"
                    );
                    false
                },
            },
        };

        info!(
            event_id = %event_id,
            outcome = ?outcome,
            retryable,
            reported,
            "delivery finished"
        );
        DeliveryStatus::Completed { outcome, retryable, reported }
    }

    /// Runs the bounded attempt sequence; `None` means cancelled.
    async fn attempt_sequence(&self, leased: &LeasedEvent) -> Option<FinalAttempt> {
        let mut result = self.attempt_once(leased).await?;

        let mut retry_index = 0_u32;
        while retry_index < self.schedule.immediate_retry_max && is_retryable_result(&result) {
            retry_index += 1;
            let delay = self.schedule.delay_for(retry_index);
            debug!(
                event_id = %leased.event.id,
                retry_index,
                delay_ms = delay.as_millis() as u64,
                "backing off before in-process retry"
            );
            tokio::select! {
                () = self.cancel.cancelled() => return None,
                () = self.clock.sleep(delay) => {},
            }
            result = self.attempt_once(leased).await?;
        }

        Some(result)
    }

    /// Executes a single attempt; `None` means cancelled.
    async fn attempt_once(&self, leased: &LeasedEvent) -> Option<FinalAttempt> {
        tokio::select! {
            () = self.cancel.cancelled() => None,
            sent = self.client.send(
                &leased.target_url,
                &leased.event.headers,
                &leased.event.payload,
            ) => Some(match sent {
                Ok(response) => FinalAttempt::Response(response),
                Err(failure) => {
                    warn!(
                        event_id = %leased.event.id,
                        target_url = %leased.target_url,
                        error = %failure,
                        "delivery attempt failed"
                    );
                    FinalAttempt::Failure(failure)
                },
            }),
        }
    }
}

/// Builds the attempt record for the final result.
///
/// Exactly one of the response and error halves is populated; request
/// headers and body are copied verbatim from the leased event.
fn build_attempt_record(
    leased: &LeasedEvent,
    started_at: String,
    finished_at: String,
    result: &FinalAttempt,
) -> AttemptRecord {
    match result {
        FinalAttempt::Response(response) => AttemptRecord {
            started_at,
            finished_at,
            request_headers: leased.event.headers.clone(),
            request_body: leased.event.payload.clone(),
            response_status: Some(i64::from(response.status)),
            response_headers: Some(response.headers.clone()),
            response_body: response.body.clone(),
            error_kind: None,
            error_message: None,
        },
        FinalAttempt::Failure(failure) => AttemptRecord {
            started_at,
            finished_at,
            request_headers: leased.event.headers.clone(),
            request_body: leased.event.payload.clone(),
            response_status: None,
            response_headers: None,
            response_body: None,
            error_kind: Some(failure.kind()),
            error_message: Some(failure.report_message()),
        },
    }
}
