//! Deterministic time control for reproducible test scenarios.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};
use fluxpoint_core::Clock;

/// Test clock whose `sleep` advances virtual time instead of waiting.
///
/// Backoff-heavy paths (in-process retry, transient store retry) run
/// instantly under this clock while still exercising their scheduling
/// logic. Elapsed virtual time is observable for assertions.
#[derive(Clone)]
pub struct TestClock {
    start: DateTime<Utc>,
    elapsed_ms: Arc<AtomicU64>,
}

impl TestClock {
    /// Creates a test clock starting at a fixed reference instant.
    pub fn new() -> Self {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Self { start, elapsed_ms: Arc::new(AtomicU64::new(0)) }
    }

    /// Creates a test clock starting at a specific time.
    pub fn with_start_time(start: DateTime<Utc>) -> Self {
        Self { start, elapsed_ms: Arc::new(AtomicU64::new(0)) }
    }

    /// Advances virtual time by the given duration.
    pub fn advance(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.elapsed_ms.fetch_add(millis, Ordering::AcqRel);
    }

    /// Total virtual time slept through this clock.
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms.load(Ordering::Acquire))
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now_utc(&self) -> DateTime<Utc> {
        let elapsed = self.elapsed_ms.load(Ordering::Acquire);
        self.start + chrono::Duration::milliseconds(i64::try_from(elapsed).unwrap_or(i64::MAX))
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.advance(duration);
        // Yield so concurrently scheduled tasks get to run.
        Box::pin(tokio::task::yield_now())
    }
}
