//! Error types for the edge gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::KvError;

/// Main error type for the gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Authentication error
    #[error("authentication error: {message}")]
    Authentication { message: String },

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// Quota exceeded
    #[error("quota exceeded")]
    QuotaExceeded,

    /// Route not found
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Upstream returned an unusable response or refused the connection
    #[error("upstream error: {message}")]
    Upstream { message: String },

    /// Upstream did not answer within the configured timeout
    #[error("upstream timeout")]
    UpstreamTimeout,

    /// Upstream is gated off after repeated health-check failures
    #[error("upstream unavailable: {upstream}")]
    UpstreamUnavailable { upstream: String },

    /// KV store failure
    #[error("kv store error: {0}")]
    Kv(#[from] KvError),

    /// HTTP client error
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal server error
    #[error("internal server error: {message}")]
    Internal { message: String },

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the client caused this error
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Authentication { .. }
                | Error::RateLimitExceeded
                | Error::QuotaExceeded
                | Error::NotFound { .. }
        )
    }

    fn status_and_title(&self) -> (StatusCode, &'static str) {
        match self {
            Error::Config { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            Error::Authentication { .. } => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            Error::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "Rate Limit Exceeded"),
            Error::QuotaExceeded => (StatusCode::TOO_MANY_REQUESTS, "Quota Exceeded"),
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, "Not Found"),
            Error::Upstream { .. } => (StatusCode::BAD_GATEWAY, "Bad Gateway"),
            Error::UpstreamTimeout => (StatusCode::GATEWAY_TIMEOUT, "Gateway Timeout"),
            Error::UpstreamUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable")
            }
            Error::Kv(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            Error::HttpClient(_) => (StatusCode::BAD_GATEWAY, "Bad Gateway"),
            Error::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
            Error::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            Error::Other(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, title) = self.status_and_title();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({
            "error": title,
            "message": self.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}
