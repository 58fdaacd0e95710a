//! Fluxpoint webhook dispatch worker.
//!
//! Stateless process that leases pending webhook events from the store,
//! delivers them to their targets, and reports outcomes back. Safe to run
//! in multiple instances against the same store; leases keep concurrent
//! workers from double-delivering.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use fluxpoint_core::{Clock, RealClock};
use fluxpoint_delivery::{DeliveryEngine, Dispatcher, StoreClient, TargetClient};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod config;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("starting fluxpoint dispatch worker");

    let config = Config::load().context("failed to load configuration")?;
    info!(
        worker_id = %config.worker_id,
        store = %config.rust_api_base_url,
        auth_configured = config.rust_api_token.is_some(),
        batch_size = config.dispatch_batch_size,
        concurrency = config.dispatch_concurrency,
        poll_interval_ms = config.dispatch_poll_interval_ms,
        lease_ms = config.dispatch_lease_ms,
        request_timeout_ms = config.dispatch_request_timeout_ms,
        immediate_retry_max = config.dispatch_immediate_retry_max,
        max_attempts = config.dispatch_max_attempts,
        "configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(RealClock::new());
    let cancel = CancellationToken::new();

    let store = Arc::new(
        StoreClient::new(config.to_store_settings(), Arc::clone(&clock))
            .context("failed to initialise store client")?,
    );
    let client = Arc::new(
        TargetClient::new(config.to_client_config())
            .context("failed to initialise delivery client")?,
    );
    let engine = Arc::new(DeliveryEngine::new(
        client,
        Arc::clone(&store),
        config.to_retry_schedule(),
        config.dispatch_max_attempts,
        Arc::clone(&clock),
        cancel.clone(),
    ));
    let dispatcher =
        Dispatcher::new(store, engine, config.to_dispatcher_config(), clock, cancel.clone());

    let dispatcher_handle = tokio::spawn(async move { dispatcher.run().await });

    shutdown_signal().await;
    info!("shutdown signal received, draining in-flight deliveries");
    cancel.cancel();

    // A second signal during the drain forces an immediate exit.
    tokio::spawn(async {
        shutdown_signal().await;
        warn!("second shutdown signal received, exiting immediately");
        std::process::exit(130);
    });

    let drain_deadline =
        Duration::from_millis(config.dispatch_request_timeout_ms) + Duration::from_secs(1);
    match tokio::time::timeout(drain_deadline, dispatcher_handle).await {
        Ok(Ok(())) => {},
        Ok(Err(join_error)) => {
            error!(error = %join_error, "dispatcher task failed during shutdown");
        },
        Err(_elapsed) => {
            warn!(
                deadline_ms = drain_deadline.as_millis() as u64,
                "drain deadline exceeded, abandoning in-flight deliveries"
            );
        },
    }

    info!("fluxpoint dispatch worker stopped");
    Ok(())
}

/// Initializes tracing with JSON output and environment-based filtering.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,fluxpoint=debug"))
        .expect("invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().json().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// Installs fresh handlers on every call so it can be awaited again while
/// draining to catch a second, forcing signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received SIGINT");
        },
        () = terminate => {
            info!("received SIGTERM");
        },
    }
}
