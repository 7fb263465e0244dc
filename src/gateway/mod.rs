//! The request entry point and generation holder.
//!
//! # Data Flow
//! ```text
//! handle(request):
//!     current generation (lock-free load)
//!     → RouteMatcher::find → 404 when nothing matches
//!     → cached CompiledPipeline (503 when the route is disabled)
//!     → ProxyDispatcher::dispatch
//!     → response (panics become 500)
//!
//! reload(config):
//!     Generation::build (validate, compile, fresh backend state)
//!     → atomic swap; requests in flight keep their generation
//! ```

pub mod generation;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{body::Body, http::Request, response::IntoResponse, response::Response};
use futures_util::FutureExt;

use crate::config::{ConfigError, GatewayConfig};
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::policy::PolicyRegistry;

pub use generation::{Generation, RouteSummary};

/// Owns the policy registry and the current generation.
#[derive(Debug)]
pub struct GatewayRouter {
    current: ArcSwap<Generation>,
    registry: PolicyRegistry,
    next_id: AtomicU64,
    reload_lock: Mutex<()>,
    started: Instant,
}

impl GatewayRouter {
    /// Build generation 1. The registry is frozen from here on.
    pub fn new(config: GatewayConfig, registry: PolicyRegistry) -> Result<Self, ConfigError> {
        let generation = Generation::build(1, config, &registry)?;
        tracing::info!(
            generation = 1,
            routes = generation.routes().len(),
            policies = ?registry.names(),
            "Gateway configuration loaded"
        );
        metrics::record_reload(true, 1);

        Ok(Self {
            current: ArcSwap::from_pointee(generation),
            registry,
            next_id: AtomicU64::new(2),
            reload_lock: Mutex::new(()),
            started: Instant::now(),
        })
    }

    /// Serve one request against the current generation.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let generation = self.current.load_full();
        match AssertUnwindSafe(generation.serve(request)).catch_unwind().await {
            Ok(response) => response,
            Err(_) => {
                tracing::error!(generation = generation.id(), "Request handler panicked");
                GatewayError::Internal("request handler panicked".into()).into_response()
            }
        }
    }

    /// Build and install a new generation. On error the current generation
    /// stays in place.
    pub fn reload(&self, config: GatewayConfig) -> Result<u64, ConfigError> {
        let _serialized = match self.reload_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match Generation::build(id, config, &self.registry) {
            Ok(generation) => {
                let routes = generation.routes().len();
                let previous = self.current.swap(Arc::new(generation));
                tracing::info!(generation = id, previous = previous.id(), routes, "Configuration reloaded");
                metrics::record_reload(true, id);
                Ok(id)
            }
            Err(e) => {
                tracing::error!(error = %e, current = self.generation_id(), "Configuration reload rejected");
                metrics::record_reload(false, id);
                Err(e)
            }
        }
    }

    pub fn current(&self) -> Arc<Generation> {
        self.current.load_full()
    }

    pub fn generation_id(&self) -> u64 {
        self.current.load().id()
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}
