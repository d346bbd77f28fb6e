//! Circuit breaking subsystem.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: downstream assumed down, calls fail fast
//! - Half-Open: testing if the downstream recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: checked lazily at call time, after reset_timeout
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails
//! ```
//!
//! # Design Decisions
//! - Per-service breaker (not global), owned by a registry
//! - Fail fast in Open state (no queueing behind a dead dependency)
//! - Single trial in Half-Open (prevents hammering a recovering service)
//! - Lazy timeout check at call time; no timer per breaker

pub mod circuit;
pub mod registry;

pub use circuit::{BreakerState, BreakerStatus, CircuitBreaker};
pub use registry::BreakerRegistry;
