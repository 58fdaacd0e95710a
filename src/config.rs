//! Environment configuration for the dispatch worker.
//!
//! All settings come from `FLUXPOINT_`-prefixed environment variables,
//! loaded once at startup. Missing required variables or unparsable
//! numerics abort startup with a fatal error.

use std::time::Duration;

use anyhow::{Context, Result};
use figment::{providers::Env, Figment};
use fluxpoint_delivery::{ClientConfig, DispatcherConfig, RetrySchedule, StoreSettings};
use serde::{Deserialize, Serialize};

/// Immutable worker configuration.
///
/// | Field | Environment variable | Default |
/// |---|---|---|
/// | `worker_id` | `FLUXPOINT_WORKER_ID` | required |
/// | `rust_api_base_url` | `FLUXPOINT_RUST_API_BASE_URL` | required |
/// | `rust_api_token` | `FLUXPOINT_RUST_API_TOKEN` | absent |
/// | `dispatch_poll_interval_ms` | `FLUXPOINT_DISPATCH_POLL_INTERVAL_MS` | 5000 |
/// | `dispatch_batch_size` | `FLUXPOINT_DISPATCH_BATCH_SIZE` | 50 |
/// | `dispatch_concurrency` | `FLUXPOINT_DISPATCH_CONCURRENCY` | 10 |
/// | `dispatch_lease_ms` | `FLUXPOINT_DISPATCH_LEASE_MS` | 30000 |
/// | `dispatch_request_timeout_ms` | `FLUXPOINT_DISPATCH_REQUEST_TIMEOUT_MS` | 10000 |
/// | `dispatch_immediate_retry_max` | `FLUXPOINT_DISPATCH_IMMEDIATE_RETRY_MAX` | 2 |
/// | `dispatch_max_attempts` | `FLUXPOINT_DISPATCH_MAX_ATTEMPTS` | 10 |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identity this worker leases and reports under.
    pub worker_id: String,

    /// Absolute base URL of the store's internal API.
    pub rust_api_base_url: String,

    /// Bearer token for store auth.
    #[serde(default)]
    pub rust_api_token: Option<String>,

    /// Pause between poll cycles in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub dispatch_poll_interval_ms: u64,

    /// Maximum events leased per poll.
    #[serde(default = "default_batch_size")]
    pub dispatch_batch_size: usize,

    /// Maximum deliveries in flight at once.
    #[serde(default = "default_concurrency")]
    pub dispatch_concurrency: usize,

    /// Lease duration requested from the store, in milliseconds.
    #[serde(default = "default_lease_ms")]
    pub dispatch_lease_ms: u64,

    /// Bound on each individual delivery attempt, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub dispatch_request_timeout_ms: u64,

    /// In-process retries after the first attempt.
    #[serde(default = "default_immediate_retry_max")]
    pub dispatch_immediate_retry_max: u32,

    /// Lifetime attempt count at which failures become terminal.
    #[serde(default = "default_max_attempts")]
    pub dispatch_max_attempts: u32,
}

impl Config {
    /// Loads and validates configuration from the environment.
    pub fn load() -> Result<Self> {
        Self::from_figment(Figment::new().merge(Env::prefixed("FLUXPOINT_")))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self =
            figment.extract().context("failed to load configuration from environment")?;
        config.validate()?;
        Ok(config)
    }

    /// Converts to the dispatcher loop configuration.
    pub fn to_dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            batch_size: self.dispatch_batch_size,
            concurrency: self.dispatch_concurrency,
            poll_interval: Duration::from_millis(self.dispatch_poll_interval_ms),
            lease_ms: self.dispatch_lease_ms,
            poll_jitter_factor: 0.2,
        }
    }

    /// Converts to the target-facing HTTP client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            request_timeout: Duration::from_millis(self.dispatch_request_timeout_ms),
            ..ClientConfig::default()
        }
    }

    /// Converts to the in-process retry schedule.
    pub fn to_retry_schedule(&self) -> RetrySchedule {
        RetrySchedule {
            immediate_retry_max: self.dispatch_immediate_retry_max,
            ..RetrySchedule::default()
        }
    }

    /// Converts to store client connection settings.
    pub fn to_store_settings(&self) -> StoreSettings {
        StoreSettings {
            base_url: self.rust_api_base_url.clone(),
            token: self.rust_api_token.clone(),
            worker_id: self.worker_id.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.worker_id.trim().is_empty() {
            anyhow::bail!("FLUXPOINT_WORKER_ID must not be empty");
        }

        if self.rust_api_base_url.trim().is_empty() {
            anyhow::bail!("FLUXPOINT_RUST_API_BASE_URL must not be empty");
        }

        if self.dispatch_batch_size == 0 {
            anyhow::bail!("FLUXPOINT_DISPATCH_BATCH_SIZE must be at least 1");
        }

        if self.dispatch_concurrency == 0 {
            anyhow::bail!("FLUXPOINT_DISPATCH_CONCURRENCY must be at least 1");
        }

        if self.dispatch_lease_ms == 0 {
            anyhow::bail!("FLUXPOINT_DISPATCH_LEASE_MS must be at least 1");
        }

        if self.dispatch_request_timeout_ms == 0 {
            anyhow::bail!("FLUXPOINT_DISPATCH_REQUEST_TIMEOUT_MS must be at least 1");
        }

        if self.dispatch_max_attempts == 0 {
            anyhow::bail!("FLUXPOINT_DISPATCH_MAX_ATTEMPTS must be at least 1");
        }

        Ok(())
    }
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_batch_size() -> usize {
    50
}

fn default_concurrency() -> usize {
    10
}

fn default_lease_ms() -> u64 {
    30_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_immediate_retry_max() -> u32 {
    2
}

fn default_max_attempts() -> u32 {
    10
}
