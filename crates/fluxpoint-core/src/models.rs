//! Wire types for the store's dispatcher endpoints.
//!
//! These records mirror the store's JSON contract exactly. Identifiers and
//! store-owned timestamps are opaque strings the worker forwards without
//! interpretation. Decoding is fail-closed: unknown fields are tolerated for
//! forward compatibility, missing required fields are a parse error.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// A webhook event as persisted by the store.
///
/// The worker only interprets `headers`, `payload` and `attempts`; the
/// remaining fields are carried for logging and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Store-assigned event identifier.
    pub id: String,
    /// Identifier of the endpoint this event targets.
    pub endpoint_id: String,
    /// Source provider that emitted the event.
    pub provider: String,
    /// Request headers to replay against the target, case preserved.
    pub headers: BTreeMap<String, String>,
    /// Raw request body to POST to the target.
    pub payload: String,
    /// Lifetime attempt count before the current lease.
    pub attempts: i64,
    /// Store-side lifecycle status.
    pub status: String,
    /// When the store first received the event.
    pub received_at: String,
    /// Store-scheduled next attempt time, if any.
    #[serde(default)]
    pub next_attempt_at: Option<String>,
    /// Expiry of the current lease, if leased.
    #[serde(default)]
    pub lease_expires_at: Option<String>,
    /// Worker holding the current lease, if leased.
    #[serde(default)]
    pub leased_by: Option<String>,
    /// Most recent delivery error recorded by the store.
    #[serde(default)]
    pub last_error: Option<String>,
}

/// One event handed to this worker under a lease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeasedEvent {
    /// The leased event.
    pub event: WebhookEvent,
    /// Destination URL for delivery. The worker trusts the store's URL.
    pub target_url: String,
    /// When the lease expires, informational only.
    pub lease_expires_at: String,
    /// Per-endpoint circuit state, opaque to the worker.
    #[serde(default)]
    pub circuit: Option<serde_json::Value>,
}

/// Body of `POST /internal/dispatcher/lease`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRequest {
    /// Maximum number of events to lease.
    pub limit: i64,
    /// Requested lease duration in milliseconds.
    pub lease_ms: i64,
    /// Identity of the requesting worker.
    pub worker_id: String,
}

/// Successful response to a lease request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseResponse {
    /// Events leased to this worker, possibly empty.
    pub events: Vec<LeasedEvent>,
}

/// Classification of a failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptErrorKind {
    /// The attempt exceeded the per-request timeout.
    Timeout,
    /// Transport or connection level failure.
    Network,
    /// The target produced malformed HTTP response framing.
    InvalidResponse,
    /// Any failure outside the other categories.
    Unexpected,
}

/// Record of one delivery's final attempt window, sent in a report.
///
/// Exactly one of `response_status` and `error_kind` is set. The response
/// body and headers may be absent even when a status is present (best-effort
/// body capture).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Wall-clock start of the delivery, ISO-8601 UTC with milliseconds.
    pub started_at: String,
    /// Wall-clock end of the delivery.
    pub finished_at: String,
    /// Headers sent to the target, copied verbatim from the event.
    pub request_headers: BTreeMap<String, String>,
    /// Body sent to the target, copied verbatim from the event.
    pub request_body: String,
    /// Final HTTP status observed, if a response was received.
    pub response_status: Option<i64>,
    /// Response headers with string values, if a response was received.
    pub response_headers: Option<BTreeMap<String, String>>,
    /// Response body text, best-effort.
    pub response_body: Option<String>,
    /// Failure classification when no response was received.
    pub error_kind: Option<AttemptErrorKind>,
    /// Short human-readable failure description.
    pub error_message: Option<String>,
}

/// The worker's classification of a finished delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportOutcome {
    /// The target acknowledged with a 2xx status.
    Delivered,
    /// Delivery failed but the store may reschedule it.
    Retry,
    /// Delivery failed terminally.
    Dead,
}

/// Body of `POST /internal/dispatcher/report`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    /// Identity of the reporting worker.
    pub worker_id: String,
    /// Event the report concerns.
    pub event_id: String,
    /// Final classification of the delivery.
    pub outcome: ReportOutcome,
    /// Whether the final result was retryable, independent of `outcome`.
    pub retryable: bool,
    /// Always `None`: the store owns retry scheduling.
    pub next_attempt_at: Option<String>,
    /// Record of the delivery's attempt window.
    pub attempt: AttemptRecord,
}

/// Successful response to a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResponse {
    /// Updated per-endpoint circuit state, logged but not acted upon.
    #[serde(default)]
    pub circuit: Option<serde_json::Value>,
}

/// Error codes the store returns on `status >= 400`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCode {
    /// Request failed schema or semantic validation.
    Validation,
    /// Missing or rejected credentials.
    Unauthorized,
    /// The store is shedding load.
    RateLimited,
    /// Referenced entity does not exist.
    NotFound,
    /// Concurrent modification conflict.
    Conflict,
    /// Store-side database failure.
    Database,
    /// Unclassified store-side failure.
    Internal,
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Database => "database",
            Self::Internal => "internal",
        };
        write!(f, "{name}")
    }
}

/// Structured error body returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Machine-readable error code.
    pub code: ApiErrorCode,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for ApiErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
