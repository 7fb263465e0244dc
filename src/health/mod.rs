//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Periodic timer
//!     → Load the current generation
//!     → Probe every target of every backend group
//!     → Target::record_success / record_failure
//!
//! Passive health checks (proxy dispatcher):
//!     Timeout or connection failure observed
//!     → Target::record_failure
//!     → Dead once the failure threshold is crossed
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary and share the same counters
//! - Any success revives a target immediately
//! - Health state is per-target, per-generation; a reload starts fresh

pub mod active;

pub use active::HealthMonitor;
