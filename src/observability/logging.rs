//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Honor `RUST_LOG` with a sensible default filter
//!
//! # Design Decisions
//! - Uses the tracing crate for structured logging
//! - Log sites attach service names, attempt counts, and event ids as
//!   fields rather than formatting them into messages
//! - Sensitive headers are redacted at the call site before emission
//!   (see `client::redact_headers`)

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// `default_filter` applies when `RUST_LOG` is unset. Calling this twice
/// panics (tracing allows one global subscriber); call it once from main.
pub fn init(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
