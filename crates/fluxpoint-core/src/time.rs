//! Time abstractions for testable timing operations.
//!
//! Provides a clock seam so backoff sleeps and attempt timestamps can be
//! driven deterministically in tests. Production code uses [`RealClock`].

use std::{future::Future, pin::Pin, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};

/// Clock abstraction for time operations.
///
/// Production code uses [`RealClock`]; tests inject controllable
/// implementations that advance virtual time instead of sleeping.
pub trait Clock: Send + Sync {
    /// Returns the current UTC wall-clock time.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Sleeps for the specified duration.
    ///
    /// In production this maps to `tokio::time::sleep`; test clocks may
    /// advance virtual time and return immediately.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Real clock backed by system time and tokio's timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock instance.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Formats a timestamp the way the store expects: ISO-8601 UTC with
/// millisecond precision.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
