//! Error taxonomy for the dispatch pipeline.
//!
//! Two closed sets flow through the core: [`DeliveryFailure`] for attempts
//! against a target, and [`StoreError`] for calls against the store's
//! internal API. Both are matched exhaustively so classification can never
//! silently drop a case. [`SetupError`] covers construction-time failures
//! that abort startup.

use fluxpoint_core::models::{ApiErrorBody, ApiErrorCode, AttemptErrorKind};
use thiserror::Error;

/// Failure of a single HTTP attempt against a target endpoint.
///
/// Cancellation is not represented here: a cancelled delivery unwinds at
/// its suspension point and never reaches classification.
#[derive(Debug, Clone, Error)]
pub enum DeliveryFailure {
    /// The attempt exceeded the configured per-request timeout.
    #[error("request timed out")]
    Timeout,

    /// Transport-level failure reaching the target.
    #[error("network error: {message}")]
    Network {
        /// Description of the transport failure.
        message: String,
    },

    /// The target produced malformed HTTP response framing.
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// Description of the framing failure.
        message: String,
    },

    /// Any failure outside the other categories.
    #[error("unexpected delivery error: {message}")]
    Unexpected {
        /// Description of the failure.
        message: String,
    },
}

impl DeliveryFailure {
    /// Maps this failure onto the wire-level error kind.
    pub fn kind(&self) -> AttemptErrorKind {
        match self {
            Self::Timeout => AttemptErrorKind::Timeout,
            Self::Network { .. } => AttemptErrorKind::Network,
            Self::InvalidResponse { .. } => AttemptErrorKind::InvalidResponse,
            Self::Unexpected { .. } => AttemptErrorKind::Unexpected,
        }
    }

    /// Whether the failure may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Unexpected { .. })
    }

    /// Short message recorded in the attempt record.
    pub fn report_message(&self) -> String {
        match self {
            Self::Timeout => "Request timed out".to_string(),
            other => other.to_string(),
        }
    }
}

/// Failure of a call against the store's internal API.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure reaching the store.
    #[error("store request failed: {message}")]
    Network {
        /// Description of the transport failure.
        message: String,
    },

    /// The store answered with a structured error body.
    #[error("store api error (http {status}): {error}")]
    Api {
        /// Decoded error body.
        error: ApiErrorBody,
        /// HTTP status the store answered with.
        status: u16,
    },

    /// The store's response did not match the expected schema.
    #[error("store response parse error: {message}")]
    Parse {
        /// Description of the decode failure.
        message: String,
    },
}

impl StoreError {
    /// Whether the store client should retry this error transparently.
    ///
    /// Only structured API errors with a transient code qualify; network
    /// and parse failures surface to the dispatcher, which continues on
    /// the next poll.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { error, .. } => matches!(
                error.code,
                ApiErrorCode::RateLimited | ApiErrorCode::Database | ApiErrorCode::Internal
            ),
            Self::Network { .. } | Self::Parse { .. } => false,
        }
    }
}

/// Construction-time failure that aborts worker startup.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The configured store base URL is not an absolute URL.
    #[error("invalid store base url: {0}")]
    InvalidBaseUrl(String),

    /// The HTTP client could not be built from the configuration.
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
