//! Outcome classification for finished deliveries.
//!
//! Pure functions, no I/O. The status table and the retryable rule are the
//! contract the store relies on when deciding whether to reschedule an
//! event, so every branch here is covered by tests.

use fluxpoint_core::models::ReportOutcome;

use crate::{client::TargetResponse, error::DeliveryFailure};

/// Final result of the in-process attempt sequence for one event.
#[derive(Debug, Clone)]
pub enum FinalAttempt {
    /// The last attempt produced an HTTP response.
    Response(TargetResponse),
    /// Every attempt failed before a response was observed.
    Failure(DeliveryFailure),
}

/// Classifies an HTTP status into a report outcome.
///
/// 2xx delivers; 408, 429 and any 5xx are retryable; everything else is
/// terminal.
pub fn classify_status(status: u16) -> ReportOutcome {
    if (200..300).contains(&status) {
        ReportOutcome::Delivered
    } else if status == 408 || status == 429 || status >= 500 {
        ReportOutcome::Retry
    } else {
        ReportOutcome::Dead
    }
}

/// Whether a status should trigger another attempt.
pub fn is_retryable_status(status: u16) -> bool {
    classify_status(status) == ReportOutcome::Retry
}

/// Resolves the reported outcome for a finished delivery.
///
/// Responses classify by their final status. Failures are `Dead` once the
/// lifetime attempt count reaches `max_attempts`, otherwise `Retry`.
pub fn resolve_outcome(
    result: &FinalAttempt,
    current_attempts: i64,
    max_attempts: u32,
) -> ReportOutcome {
    match result {
        FinalAttempt::Response(response) => classify_status(response.status),
        FinalAttempt::Failure(_) => {
            if current_attempts.saturating_add(1) >= i64::from(max_attempts) {
                ReportOutcome::Dead
            } else {
                ReportOutcome::Retry
            }
        },
    }
}

/// Whether the final result was retryable, independent of the outcome.
///
/// A timeout at the attempt cap still reports `retryable = true` even
/// though the outcome is `Dead`; the store uses the flag for diagnostics,
/// not scheduling.
pub fn is_retryable_result(result: &FinalAttempt) -> bool {
    match result {
        FinalAttempt::Response(response) => is_retryable_status(response.status),
        FinalAttempt::Failure(failure) => failure.is_retryable(),
    }
}
