//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Validate → Construct components → Start periodic tasks
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast to tasks → in-progress cycles complete → exit
//! ```
//!
//! # Design Decisions
//! - Every periodic task is owned by the component that starts it,
//!   through a [`TaskSlot`] that makes duplicate starts a no-op
//! - Stopping is deterministic: no fire-and-forget global timers

pub mod shutdown;

pub use shutdown::{Shutdown, TaskSlot};
