//! Typed HTTP client for the store's dispatcher endpoints.
//!
//! Wraps `POST /internal/dispatcher/lease` and `POST
//! /internal/dispatcher/report` with serialization, bearer auth and
//! fail-closed response decoding. Transient store-side errors
//! (`rate_limited`, `database`, `internal`) are retried here with a short
//! exponential backoff; everything else surfaces to the caller.

use std::{sync::Arc, time::Duration};

use fluxpoint_core::{
    models::{ApiErrorBody, LeaseRequest, LeaseResponse, ReportRequest, ReportResponse},
    Clock,
};
use reqwest::header::ACCEPT;
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::error::{SetupError, StoreError};

/// Additional attempts after the first for transient store errors.
const TRANSIENT_RETRY_MAX: u32 = 5;

/// Base delay for the transient retry backoff.
const TRANSIENT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Connection settings for the store client.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Absolute base URL of the store's internal API.
    pub base_url: String,
    /// Bearer token for store auth, if configured.
    pub token: Option<String>,
    /// Identity of this worker, sent with every lease.
    pub worker_id: String,
}

/// Typed client over the store's lease and report endpoints.
///
/// The store is trusted local infrastructure, so requests carry no explicit
/// timeout; cancellation at the dispatcher bounds them instead.
pub struct StoreClient {
    client: reqwest::Client,
    lease_url: String,
    report_url: String,
    token: Option<String>,
    worker_id: String,
    clock: Arc<dyn Clock>,
}

impl StoreClient {
    /// Builds the client, validating that the base URL is absolute.
    pub fn new(settings: StoreSettings, clock: Arc<dyn Clock>) -> Result<Self, SetupError> {
        settings
            .base_url
            .parse::<reqwest::Url>()
            .map_err(|error| SetupError::InvalidBaseUrl(format!("{}: {error}", settings.base_url)))?;

        let base = settings.base_url.trim_end_matches('/');
        let client = reqwest::Client::builder().build()?;

        Ok(Self {
            client,
            lease_url: format!("{base}/internal/dispatcher/lease"),
            report_url: format!("{base}/internal/dispatcher/report"),
            token: settings.token,
            worker_id: settings.worker_id,
            clock,
        })
    }

    /// Identity this client leases and reports under.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Leases up to `limit` pending events for `lease_ms` milliseconds.
    pub async fn lease(&self, limit: i64, lease_ms: i64) -> Result<LeaseResponse, StoreError> {
        let request =
            LeaseRequest { limit, lease_ms, worker_id: self.worker_id.clone() };
        self.post(&self.lease_url, &request).await
    }

    /// Submits the outcome of one delivery.
    pub async fn report(&self, request: &ReportRequest) -> Result<ReportResponse, StoreError> {
        self.post(&self.report_url, request).await
    }

    /// POSTs a JSON body, retrying transient store errors with exponential
    /// backoff (100 ms base, up to five additional attempts).
    async fn post<B, R>(&self, url: &str, body: &B) -> Result<R, StoreError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let mut attempt = 0_u32;
        loop {
            match self.post_once(url, body).await {
                Err(error) if error.is_transient() && attempt < TRANSIENT_RETRY_MAX => {
                    let delay = TRANSIENT_BASE_DELAY * 2_u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient store error, backing off"
                    );
                    self.clock.sleep(delay).await;
                },
                other => return other,
            }
        }
    }

    async fn post_once<B, R>(&self, url: &str, body: &B) -> Result<R, StoreError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let mut request =
            self.client.post(url).header(ACCEPT, "application/json").json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|error| StoreError::Network { message: error.to_string() })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|error| StoreError::Network { message: error.to_string() })?;

        if status.as_u16() >= 400 {
            return match serde_json::from_slice::<ApiErrorBody>(&bytes) {
                Ok(error) => Err(StoreError::Api { error, status: status.as_u16() }),
                Err(error) => Err(StoreError::Parse {
                    message: format!("undecodable error body (http {status}): {error}"),
                }),
            };
        }

        if !status.is_success() {
            return Err(StoreError::Parse {
                message: format!("unexpected store status {status}"),
            });
        }

        serde_json::from_slice(&bytes)
            .map_err(|error| StoreError::Parse { message: error.to_string() })
    }
}
