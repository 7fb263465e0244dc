//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router that hands every request to the gateway
//! - Configure HTTP/1.1 and HTTP/2 support
//! - Wire up middleware (request ID, tracing, body limit)
//! - Start the health monitor and apply config updates
//! - Serve until shutdown, then drain

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::gateway::GatewayRouter;
use crate::health::HealthMonitor;
use crate::lifecycle::shutdown::{wait, Shutdown};

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    gateway: Arc<GatewayRouter>,
    shutdown: Arc<Shutdown>,
}

impl HttpServer {
    pub fn new(gateway: Arc<GatewayRouter>, config: &GatewayConfig, shutdown: Arc<Shutdown>) -> Self {
        let router = Self::build_router(config, gateway.clone());
        Self {
            router,
            gateway,
            shutdown,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, gateway: Arc<GatewayRouter>) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size));

        Router::new()
            .fallback(gateway_handler)
            .with_state(gateway)
            .layer(middleware)
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// `updates` carries configurations from the file watcher; each one is
    /// installed as a new generation.
    pub async fn run(
        self,
        listener: TcpListener,
        updates: Option<mpsc::UnboundedReceiver<GatewayConfig>>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, generation = self.gateway.generation_id(), "HTTP server starting");

        let monitor = HealthMonitor::new(self.gateway.clone());
        let mut tasks = vec![tokio::spawn(monitor.run(self.shutdown.subscribe()))];
        if let Some(rx) = updates {
            tasks.push(tokio::spawn(apply_updates(
                rx,
                self.gateway.clone(),
                self.shutdown.subscribe(),
            )));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(wait(self.shutdown.subscribe()))
            .await;

        stop_background(result, &self.shutdown, tasks).await
    }
}

/// Stop and join the background tasks once serving ends, on success or
/// error, then hand back the serve result.
async fn stop_background(
    result: Result<(), std::io::Error>,
    shutdown: &Shutdown,
    tasks: Vec<JoinHandle<()>>,
) -> Result<(), std::io::Error> {
    shutdown.trigger();
    for task in tasks {
        let _ = task.await;
    }

    match &result {
        Ok(()) => tracing::info!("HTTP server stopped"),
        Err(e) => tracing::error!(error = %e, "HTTP server failed"),
    }
    result
}

/// Every inbound request goes to the gateway.
async fn gateway_handler(State(gateway): State<Arc<GatewayRouter>>, request: Request<Body>) -> Response {
    gateway.handle(request).await
}

async fn apply_updates(
    mut rx: mpsc::UnboundedReceiver<GatewayConfig>,
    gateway: Arc<GatewayRouter>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = rx.recv() => match update {
                // Errors are logged by reload; the current generation stays.
                Some(config) => {
                    let _ = gateway.reload(config);
                }
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }
}
