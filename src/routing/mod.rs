//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, host, path)
//!     → matcher.rs (ordered scan over compiled patterns)
//!     → pattern.rs (segment matching, parameter capture)
//!     → Return: RouteMatch or None
//!
//! Route Compilation (per generation):
//!     Route[]
//!     → Parse path patterns
//!     → Sort by specificity, then declaration order
//!     → Freeze as immutable RouteMatcher
//! ```
//!
//! # Design Decisions
//! - Matchers are compiled once per generation, immutable at runtime
//! - No regex in hot path (segment comparison only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod pattern;

pub use matcher::{RouteMatch, RouteMatcher};
pub use pattern::{HostPattern, PathPattern, PatternError};
