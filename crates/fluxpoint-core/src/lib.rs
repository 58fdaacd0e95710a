//! Wire models and foundational abstractions for the dispatch worker.
//!
//! Defines the store wire contract (lease and report payloads) and the
//! clock seam used to make retry timing deterministic in tests. The
//! delivery crate depends on these types for everything it exchanges
//! with the store.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod models;
pub mod time;

pub use models::{
    ApiErrorBody, ApiErrorCode, AttemptErrorKind, AttemptRecord, LeaseRequest, LeaseResponse,
    LeasedEvent, ReportOutcome, ReportRequest, ReportResponse, WebhookEvent,
};
pub use time::{format_timestamp, Clock, RealClock};
