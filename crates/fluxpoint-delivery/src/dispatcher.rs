//! Outer poll loop: lease a batch, fan deliveries out, sleep, repeat.
//!
//! One dispatcher runs per worker process. Within a poll cycle up to
//! `concurrency` deliveries proceed in parallel, each owning its leased
//! event; there is no shared mutable state between them. Store failures
//! are logged and the loop continues on the normal cadence.

use std::{sync::Arc, time::Duration};

use fluxpoint_core::{models::ReportOutcome, Clock};
use tokio::{
    sync::{RwLock, Semaphore},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    engine::{DeliveryEngine, DeliveryStatus},
    retry::jittered,
    store::StoreClient,
};

/// Configuration for the dispatcher loop.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum events to lease per poll.
    pub batch_size: usize,

    /// Maximum deliveries in flight at once.
    pub concurrency: usize,

    /// Pause between poll cycles, before jitter.
    pub poll_interval: Duration,

    /// Lease duration requested from the store, in milliseconds.
    pub lease_ms: u64,

    /// Jitter fraction applied to the poll pause.
    pub poll_jitter_factor: f64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::DEFAULT_BATCH_SIZE,
            concurrency: crate::DEFAULT_CONCURRENCY,
            poll_interval: Duration::from_secs(5),
            lease_ms: 30_000,
            poll_jitter_factor: 0.2,
        }
    }
}

/// Counters for dispatcher monitoring.
#[derive(Debug, Clone, Default)]
pub struct DispatcherStats {
    /// Poll cycles that leased at least one event.
    pub busy_polls: u64,
    /// Deliveries that ran to completion.
    pub events_processed: u64,
    /// Deliveries classified `delivered`.
    pub delivered: u64,
    /// Deliveries classified `retry`.
    pub retried: u64,
    /// Deliveries classified `dead`.
    pub dead: u64,
    /// Deliveries interrupted by shutdown.
    pub cancelled: u64,
    /// Reports that failed to reach the store.
    pub report_failures: u64,
}

/// Poll loop driving batched webhook delivery.
pub struct Dispatcher {
    store: Arc<StoreClient>,
    engine: Arc<DeliveryEngine>,
    config: DispatcherConfig,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    stats: Arc<RwLock<DispatcherStats>>,
}

impl Dispatcher {
    /// Creates a dispatcher over the shared store client and engine.
    pub fn new(
        store: Arc<StoreClient>,
        engine: Arc<DeliveryEngine>,
        config: DispatcherConfig,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            engine,
            config,
            clock,
            cancel,
            stats: Arc::new(RwLock::new(DispatcherStats::default())),
        }
    }

    /// Runs poll cycles until cancelled.
    pub async fn run(&self) {
        info!(
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "dispatcher starting"
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.run_once().await;

            let pause = jittered(self.config.poll_interval, self.config.poll_jitter_factor);
            tokio::select! {
                () = self.clock.sleep(pause) => {},
                () = self.cancel.cancelled() => break,
            }
        }

        info!("dispatcher stopped");
    }

    /// Executes one lease-then-deliver round.
    ///
    /// Lease failures are logged and absorbed; the caller decides when to
    /// poll again. Exposed separately so tests can drive single rounds.
    pub async fn run_once(&self) {
        let limit = i64::try_from(self.config.batch_size).unwrap_or(i64::MAX);
        let lease_ms = i64::try_from(self.config.lease_ms).unwrap_or(i64::MAX);

        let leased = tokio::select! {
            () = self.cancel.cancelled() => return,
            response = self.store.lease(limit, lease_ms) => match response {
                Ok(response) => response,
                Err(store_error) => {
                    error!(error = %store_error, "lease poll failed");
                    return;
                },
            },
        };

        if leased.events.is_empty() {
            debug!("no pending events leased");
            return;
        }

        info!(count = leased.events.len(), "processing leased batch");
        self.stats.write().await.busy_polls += 1;

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut deliveries = JoinSet::new();

        for event in leased.events {
            let permit = tokio::select! {
                () = self.cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_closed) => break,
                },
            };

            let engine = Arc::clone(&self.engine);
            deliveries.spawn(async move {
                let _permit = permit;
                engine.deliver(event).await
            });
        }

        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok(status) => self.record(status).await,
                Err(join_error) => {
                    error!(error = %join_error, "delivery task failed to join");
                },
            }
        }
    }

    /// Returns a snapshot of the dispatcher counters.
    pub async fn stats(&self) -> DispatcherStats {
        self.stats.read().await.clone()
    }

    async fn record(&self, status: DeliveryStatus) {
        let mut stats = self.stats.write().await;
        match status {
            DeliveryStatus::Completed { outcome, reported, .. } => {
                stats.events_processed += 1;
                match outcome {
                    ReportOutcome::Delivered => stats.delivered += 1,
                    ReportOutcome::Retry => stats.retried += 1,
                    ReportOutcome::Dead => stats.dead += 1,
                }
                if !reported {
                    stats.report_failures += 1;
                }
            },
            DeliveryStatus::Cancelled => stats.cancelled += 1,
        }
    }
}
