//! Webhook dispatch pipeline: lease, deliver, classify, report.
//!
//! Implements the stateless execution half of the Fluxpoint webhook
//! platform. The authoritative store owns persistence, durable retry
//! scheduling and circuit state; this crate leases batches of pending
//! events over HTTP, attempts delivery to each target with bounded
//! in-process retry, and reports one classified outcome per event.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  lease   ┌─────────────┐  POST    ┌─────────────┐
//! │ Dispatcher │─────────▶│ StoreClient │          │   Target    │
//! └────────────┘          └─────────────┘          │  Endpoints  │
//!        │ fan out (bounded)       ▲               └─────────────┘
//!        ▼                        │ report                ▲
//! ┌────────────────┐             │                       │
//! │ DeliveryEngine │─────────────┘───────────────────────┘
//! └────────────────┘   classify + attempt record
//! ```
//!
//! Key properties:
//! - **At-least-once**: a delivery that cannot be reported is re-leased by
//!   the store once its lease expires.
//! - **Bounded concurrency**: at most `concurrency` deliveries in flight
//!   per poll cycle, each owning its event end to end.
//! - **Cooperative cancellation**: every suspension point races the shared
//!   cancellation token; cancelled deliveries exit without reporting.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod client;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod retry;
pub mod store;

pub use classify::{classify_status, is_retryable_status, resolve_outcome, FinalAttempt};
pub use client::{ClientConfig, TargetClient, TargetResponse};
pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherStats};
pub use engine::{DeliveryEngine, DeliveryStatus};
pub use error::{DeliveryFailure, SetupError, StoreError};
pub use retry::RetrySchedule;
pub use store::{StoreClient, StoreSettings};

/// Default lease batch size per poll.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default number of concurrent deliveries.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default in-process retries after the first attempt.
pub const DEFAULT_IMMEDIATE_RETRY_MAX: u32 = 2;

/// Default lifetime attempt cap for terminal failure classification.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
