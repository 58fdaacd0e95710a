//! Builders for leased events with sensible defaults.

use std::collections::BTreeMap;

use fluxpoint_core::models::{LeasedEvent, WebhookEvent};

/// Builder for leased events handed to the delivery engine in tests.
pub struct LeasedEventBuilder {
    id: String,
    endpoint_id: String,
    provider: String,
    headers: BTreeMap<String, String>,
    payload: String,
    attempts: i64,
    target_url: String,
    circuit: Option<serde_json::Value>,
}

impl LeasedEventBuilder {
    /// Creates a builder with defaults for every field except the target.
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            id: "evt_test".to_string(),
            endpoint_id: "ep_test".to_string(),
            provider: "test-provider".to_string(),
            headers: BTreeMap::from([(
                "X-Test-Signature".to_string(),
                "sig-value".to_string(),
            )]),
            payload: r#"{"event":"test"}"#.to_string(),
            attempts: 0,
            target_url: target_url.into(),
            circuit: None,
        }
    }

    /// Sets the event identifier.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the lifetime attempt count before this lease.
    #[must_use]
    pub fn attempts(mut self, attempts: i64) -> Self {
        self.attempts = attempts;
        self
    }

    /// Replaces the request headers.
    #[must_use]
    pub fn headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Adds a single request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the request payload.
    #[must_use]
    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Attaches an opaque circuit snapshot.
    #[must_use]
    pub fn circuit(mut self, circuit: serde_json::Value) -> Self {
        self.circuit = Some(circuit);
        self
    }

    /// Builds the leased event.
    pub fn build(self) -> LeasedEvent {
        LeasedEvent {
            event: WebhookEvent {
                id: self.id,
                endpoint_id: self.endpoint_id,
                provider: self.provider,
                headers: self.headers,
                payload: self.payload,
                attempts: self.attempts,
                status: "in_flight".to_string(),
                received_at: "2024-03-01T11:59:00.000Z".to_string(),
                next_attempt_at: None,
                lease_expires_at: Some("2024-03-01T12:00:30.000Z".to_string()),
                leased_by: Some("w1".to_string()),
                last_error: None,
            },
            target_url: self.target_url,
            lease_expires_at: "2024-03-01T12:00:30.000Z".to_string(),
            circuit: self.circuit,
        }
    }
}
