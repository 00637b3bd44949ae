//! Error types for the cache and resilience layers
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache layers.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Cache is full and eviction failed
    #[error("Cache full: {0}")]
    CacheFull(String),

    /// Remote (L2) store unreachable or rejected the call
    #[error("Remote cache error: {0}")]
    Remote(String),

    /// Value could not be encoded for, or decoded from, the remote store
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::CacheFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Remote(_) => StatusCode::BAD_GATEWAY,
            CacheError::Serialization(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

// == Circuit Error ==
/// Outcome of a call routed through a circuit breaker.
///
/// `Operation` carries the wrapped operation's error untouched; `Open` means
/// the operation was never invoked.
#[derive(Error, Debug)]
pub enum CircuitError<E> {
    /// The circuit is open and the call was rejected without running.
    #[error("circuit '{name}' is open, retry after {retry_after:?}")]
    Open { name: String, retry_after: Duration },

    /// The operation ran and failed.
    #[error("{0}")]
    Operation(E),
}

impl<E> CircuitError<E> {
    /// True when the call was short-circuited.
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    /// Returns the operation's own error, or `None` for a rejected call.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            CircuitError::Operation(err) => Some(err),
            CircuitError::Open { .. } => None,
        }
    }
}

// == Fetch Error ==
/// Error returned by read-through lookups that may call an upstream.
#[derive(Error, Debug)]
pub enum FetchError<E> {
    #[error("{0}")]
    Cache(#[from] CacheError),

    #[error("{0}")]
    Circuit(CircuitError<E>),
}

impl<E> From<CircuitError<E>> for FetchError<E> {
    fn from(err: CircuitError<E>) -> Self {
        FetchError::Circuit(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct UpstreamDown(&'static str);

    impl std::fmt::Display for UpstreamDown {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "upstream down: {}", self.0)
        }
    }

    #[test]
    fn test_operation_error_is_preserved() {
        let err: CircuitError<UpstreamDown> = CircuitError::Operation(UpstreamDown("503"));
        assert!(!err.is_open());
        assert_eq!(err.to_string(), "upstream down: 503");
        assert_eq!(err.into_operation_error(), Some(UpstreamDown("503")));
    }

    #[test]
    fn test_open_error_has_no_operation_error() {
        let err: CircuitError<UpstreamDown> = CircuitError::Open {
            name: "scraper".to_string(),
            retry_after: Duration::from_secs(3),
        };
        assert!(err.is_open());
        assert!(err.to_string().contains("scraper"));
        assert_eq!(err.into_operation_error(), None);
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (CacheError::NotFound("k".into()), StatusCode::NOT_FOUND),
            (CacheError::InvalidRequest("bad".into()), StatusCode::BAD_REQUEST),
            (CacheError::CacheFull("full".into()), StatusCode::SERVICE_UNAVAILABLE),
            (CacheError::Remote("down".into()), StatusCode::BAD_GATEWAY),
            (CacheError::Internal("oops".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
