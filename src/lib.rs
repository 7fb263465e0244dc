//! Config-driven HTTP API gateway with per-route policy pipelines.

// Core subsystems
pub mod config;
pub mod gateway;
pub mod http;
pub mod pipeline;
pub mod policy;
pub mod proxy;
pub mod routing;

// Traffic management
pub mod health;
pub mod load_balancer;

// Cross-cutting concerns
pub mod admin;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use gateway::GatewayRouter;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use policy::PolicyRegistry;
