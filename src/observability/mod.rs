//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, file, remote)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging with field-based context
//! - Metrics are cheap (atomic increments)
//! - Component snapshots (breaker status, discovery summary, bus stats)
//!   are the query-style observability surface; this module covers the
//!   push-style surface

pub mod logging;
pub mod metrics;
