//! HTTP client for delivery attempts against target endpoints.
//!
//! One pooled client is shared by all deliveries; it is safe for concurrent
//! use and enforces the per-attempt timeout. Transport errors are mapped
//! onto the closed [`DeliveryFailure`] taxonomy for classification.

use std::{collections::BTreeMap, time::Duration};

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use tracing::{debug, warn};

use crate::error::{DeliveryFailure, SetupError};

/// Configuration for the target-facing HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound on each individual delivery attempt.
    pub request_timeout: Duration,
    /// User agent string for outbound requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            user_agent: "Fluxpoint-Dispatcher/1.0".to_string(),
            max_redirects: 3,
        }
    }
}

/// Response captured from a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers with string-representable values.
    pub headers: BTreeMap<String, String>,
    /// Response body text; `None` when the body could not be read.
    pub body: Option<String>,
}

/// HTTP client for webhook delivery, shared across all in-flight deliveries.
#[derive(Debug, Clone)]
pub struct TargetClient {
    client: reqwest::Client,
}

impl TargetClient {
    /// Builds the pooled client with the configured timeout and limits.
    pub fn new(config: ClientConfig) -> Result<Self, SetupError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .build()?;

        Ok(Self { client })
    }

    /// Executes one delivery attempt: POST the event payload to the target.
    ///
    /// The event's headers are sent verbatim; `Content-Type:
    /// application/json` is added only when the event carries none. The
    /// response body is read to completion so the pooled connection is
    /// released; a body read failure yields `body: None` without failing
    /// the attempt.
    pub async fn send(
        &self,
        target_url: &str,
        headers: &BTreeMap<String, String>,
        payload: &str,
    ) -> Result<TargetResponse, DeliveryFailure> {
        let mut request = self.client.post(target_url).body(payload.to_owned());

        let mut has_content_type = false;
        for (name, value) in headers {
            if name.eq_ignore_ascii_case("content-type") {
                has_content_type = true;
            }
            request = request.header(name, value);
        }
        if !has_content_type {
            request = request.header(CONTENT_TYPE, "application/json");
        }

        let response = request.send().await.map_err(map_send_error)?;

        let status = response.status().as_u16();
        let response_headers = string_headers(response.headers());
        debug!(status, url = target_url, "target responded");

        let body = match response.text().await {
            Ok(text) => Some(text),
            Err(error) => {
                warn!(status, url = target_url, error = %error, "failed to read response body");
                None
            },
        };

        Ok(TargetResponse { status, headers: response_headers, body })
    }
}

/// Maps a reqwest send error onto the delivery failure taxonomy.
fn map_send_error(error: reqwest::Error) -> DeliveryFailure {
    if error.is_timeout() {
        DeliveryFailure::Timeout
    } else if error.is_connect() || error.is_request() {
        DeliveryFailure::Network { message: error.to_string() }
    } else if error.is_decode() || error.is_body() {
        DeliveryFailure::InvalidResponse { message: error.to_string() }
    } else {
        DeliveryFailure::Unexpected { message: error.to_string() }
    }
}

/// Extracts string-valued headers from a reqwest header map.
fn string_headers(header_map: &HeaderMap) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for (name, value) in header_map {
        if let Ok(value) = value.to_str() {
            headers.insert(name.to_string(), value.to_string());
        }
    }
    headers
}
