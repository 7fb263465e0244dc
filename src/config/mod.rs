//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (YAML/TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (structural checks)
//!     → GatewayConfig (raw, serde types)
//!     → model.rs (parse patterns, resolve policy params)
//!     → ConfigModel (validated, immutable, one per generation)
//!
//! On reload signal:
//!     watcher.rs detects change (or SIGHUP / admin API)
//!     → loader.rs loads new config
//!     → GatewayRouter builds a new generation
//!     → atomic swap, in-flight requests finish on the old one
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation collects every error instead of stopping at the first

pub mod loader;
pub mod model;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError, ConfigFormat};
pub use model::{BackendGroupSpec, ConfigModel, PolicyRef, Route, RoutePattern};
pub use schema::{BackendGroupConfig, GatewayConfig, ListenerConfig, RouteConfig, Strategy};
pub use validation::ValidationError;
