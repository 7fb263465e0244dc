//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → proxy dispatcher enforces connect/request timeout
//!     → On connection failure: retries.rs (retryable method? budget left?)
//!     → backoff.rs (delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - Retries only for idempotent requests (GET, HEAD, etc.)
//! - A timed-out request is never retried
//! - Retry budget prevents retry storms under load

pub mod backoff;
pub mod retries;

pub use backoff::calculate_backoff;
pub use retries::{is_retryable, RetryBudget};
