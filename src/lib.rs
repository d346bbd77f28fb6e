//! Resilient inter-service communication core.
//!
//! Protects outbound calls from a gateway to its downstream services:
//! per-service circuit breaking, instance discovery with health probing,
//! a retrying HTTP client, and an event bus with at-least-once remote
//! delivery backed by a bounded retry queue.

pub mod breaker;
pub mod bus;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use breaker::{BreakerRegistry, CircuitBreaker};
pub use bus::EventBus;
pub use client::ServiceClient;
pub use config::CoreConfig;
pub use discovery::ServiceDiscovery;
pub use error::Error;
pub use lifecycle::Shutdown;
