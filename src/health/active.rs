//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe targets of the current generation
//! - Update target liveness based on results

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Uri};
use futures_util::future::join_all;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::time;

use crate::gateway::GatewayRouter;
use crate::load_balancer::{BackendGroup, Target};
use crate::observability::metrics;
use crate::proxy::dispatcher::upstream_uri;

pub struct HealthMonitor {
    router: Arc<GatewayRouter>,
    client: Client<HttpConnector, Body>,
}

impl HealthMonitor {
    pub fn new(router: Arc<GatewayRouter>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { router, client }
    }

    /// Probe until shutdown. Interval and path are re-read from the current
    /// generation before every round.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Health monitor starting");

        loop {
            let interval =
                Duration::from_secs(self.router.current().health_check().interval_secs.max(1));
            tokio::select! {
                _ = time::sleep(interval) => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One probing round over every target.
    pub async fn check_all(&self) {
        let generation = self.router.current();
        let config = generation.health_check();
        if !config.enabled {
            return;
        }

        let path: Uri = match config.path.parse() {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(path = %config.path, error = %e, "Invalid health check path");
                return;
            }
        };
        let timeout = Duration::from_secs(config.timeout_secs);

        let probes = generation
            .backends()
            .all_targets()
            .into_iter()
            .map(|(group, target)| self.check_one(group, target, &path, timeout));
        join_all(probes).await;
    }

    async fn check_one(&self, group: Arc<BackendGroup>, target: Arc<Target>, path: &Uri, timeout: Duration) {
        let healthy = self.probe(&target, path, timeout).await;

        if healthy {
            if target.record_success() {
                tracing::info!(group = %group.name, target = %target.url, "Target revived by health check");
            }
        } else if target.record_failure(group.failure_threshold()) {
            tracing::warn!(group = %group.name, target = %target.url, "Target marked dead by health check");
        }

        metrics::record_backend_health(&group.name, target.url.as_str(), target.is_alive());
    }

    async fn probe(&self, target: &Target, path: &Uri, timeout: Duration) -> bool {
        let uri = match upstream_uri(&target.url, path) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(target = %target.url, error = %e, "Failed to build health check uri");
                return false;
            }
        };
        let request = match Request::builder()
            .method("GET")
            .uri(uri)
            .header("user-agent", concat!("policy-gateway-health/", env!("CARGO_PKG_VERSION")))
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!("Failed to build health check request: {}", e);
                return false;
            }
        };

        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let success = response.status().is_success();
                if !success {
                    tracing::warn!(target = %target.url, status = %response.status(), "Health check failed: non-success status");
                }
                success
            }
            Ok(Err(e)) => {
                tracing::warn!(target = %target.url, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(target = %target.url, "Health check failed: timeout");
                false
            }
        }
    }
}
