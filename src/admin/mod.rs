//! Status surface and admin API.
//!
//! ```text
//! GET  /, /health, /status   public status document
//! GET  /admin/routes         routes of the current generation   (bearer key)
//! GET  /admin/backends       target liveness and in-flight load (bearer key)
//! POST /admin/reload         reload the config file from disk   (bearer key)
//! ```

pub mod auth;
pub mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::gateway::GatewayRouter;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared state of the admin listener.
#[derive(Debug, Clone)]
pub struct AdminState {
    pub router: Arc<GatewayRouter>,
    pub api_key: Arc<str>,
    pub config_path: Option<PathBuf>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    let protected = Router::new()
        .route("/admin/routes", get(get_routes))
        .route("/admin/backends", get(get_backends))
        .route("/admin/reload", post(post_reload))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/", get(get_status))
        .route("/health", get(get_status))
        .route("/status", get(get_status))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
