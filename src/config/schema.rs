//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits so the same schema deserializes from TOML
//! and YAML documents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Deployment environment reported on the status surface.
    pub environment: Option<String>,

    /// Route definitions mapping requests to backend groups.
    pub routes: Vec<RouteConfig>,

    /// Backend group definitions.
    pub backend_groups: Vec<BackendGroupConfig>,

    /// Named, reusable policy parameter sets.
    pub policy_params: BTreeMap<String, Map<String, Value>>,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,

    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Route configuration mapping request patterns to a backend group.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub id: String,

    /// Path patterns, checked in declaration order.
    pub patterns: Vec<PatternConfig>,

    /// Policies applied to matching requests, in order.
    #[serde(default)]
    pub policies: Vec<PolicyRefConfig>,

    /// Backend group name to forward to.
    pub backend_group: String,

    /// Overrides `timeouts.request_secs` for this route.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// A single path pattern with its method and host constraints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PatternConfig {
    /// Path pattern, e.g. `/orders/:id` or `/auth/*`.
    pub path: String,

    /// Allowed methods. Empty means any method.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Host to match (exact, case-insensitive, or `*.example.com`).
    #[serde(default)]
    pub host: Option<String>,
}

/// Reference from a route to a registered policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolicyRefConfig {
    /// Registered policy name (e.g. `key-auth`).
    pub name: String,

    /// Name of a `policy_params` entry used as the base parameter set.
    #[serde(default)]
    pub params_from: Option<String>,

    /// Inline parameters; keys override those from `params_from`.
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Backend group configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendGroupConfig {
    /// Unique group name referenced by routes.
    pub name: String,

    /// Target base URLs (e.g. "http://127.0.0.1:3000").
    pub targets: Vec<String>,

    /// Load-balancing strategy.
    #[serde(default)]
    pub strategy: Strategy,
}

/// Load-balancing strategy for a backend group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    RoundRobin,
    Random,
    #[serde(alias = "least_conn")]
    LeastConnections,
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Path to probe for HTTP health checks.
    pub path: String,

    /// Consecutive failures before a target is marked dead.
    pub failure_threshold: u32,

    /// How long a dead target is skipped before one request may try it
    /// again, in milliseconds. Applies with or without active probing.
    pub dead_cooldown_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            timeout_secs: 5,
            path: "/health".to_string(),
            failure_threshold: 3,
            dead_cooldown_ms: 10_000,
        }
    }
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Default request timeout (time until response headers) in seconds.
    pub request_secs: u64,

    /// Idle pooled connection timeout in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            idle_secs: 60,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Share of requests that may be retries (0.1 = 10%).
    pub budget_ratio: f64,

    /// Largest request body buffered to allow a retry.
    pub max_buffered_body: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 50,
            max_delay_ms: 1000,
            budget_ratio: 0.1,
            max_buffered_body: 64 * 1024,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin and status listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin/status listener.
    pub enabled: bool,

    /// API key for `/admin/*` endpoints (Bearer token).
    pub api_key: String,

    /// Admin listener bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:9876".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
