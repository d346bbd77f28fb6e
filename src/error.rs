//! Error taxonomy for outbound calls and event delivery.
//!
//! # Design Decisions
//! - Gate errors (circuit open) are terminal: no network attempt, no retry
//! - Resolution, transport, and application errors all feed the same
//!   retry/breaker accounting in the service client
//! - The last attempt's error is surfaced unchanged to the caller

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the communication core.
#[derive(Debug, Error)]
pub enum Error {
    /// The circuit breaker for the service is open; the call was rejected
    /// before any network attempt.
    #[error("circuit breaker open for service '{service}'")]
    CircuitOpen { service: String },

    /// Service discovery had no healthy instance to route to.
    #[error("no healthy instance available for service '{service}'")]
    NoHealthyInstance { service: String },

    /// The downstream returned a non-2xx status.
    #[error("service '{service}' responded {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    /// The in-flight request exceeded its deadline and was aborted.
    #[error("request to service '{service}' timed out after {timeout:?}")]
    Timeout { service: String, timeout: Duration },

    /// Connection-level failure (refused, reset, DNS, malformed response).
    #[error("transport error calling service '{service}': {source}")]
    Transport {
        service: String,
        #[source]
        source: reqwest::Error,
    },

    /// A 2xx response body that failed to parse as JSON.
    #[error("invalid JSON from service '{service}': {source}")]
    Decode {
        service: String,
        #[source]
        source: serde_json::Error,
    },

    /// A request path could not be joined onto an instance base URL.
    #[error("invalid request path '{path}': {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: url::ParseError,
    },

    /// A local event handler reported a failure. Isolated per subscriber;
    /// never propagated to the publisher.
    #[error("local handler failed for event type '{event_type}': {message}")]
    Handler {
        event_type: String,
        message: String,
    },
}

impl Error {
    /// True if this error came from the breaker gate (never retried).
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Error::CircuitOpen { .. })
    }

    /// HTTP status code, if this is an application-level error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
