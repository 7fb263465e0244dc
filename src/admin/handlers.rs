use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, response::IntoResponse, response::Response, Json};
use chrono::Utc;
use serde::Serialize;

use crate::admin::AdminState;
use crate::config::{load_config, ConfigError};
use crate::error::error_response;
use crate::gateway::RouteSummary;
use crate::load_balancer::TargetSnapshot;

pub const SERVICE_NAME: &str = "policy-gateway";

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: String,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub environment: String,
    pub generation: u64,
    /// Route id → path patterns.
    pub routes: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct RoutesResponse {
    pub generation: u64,
    pub routes: Vec<RouteSummary>,
}

#[derive(Debug, Serialize)]
pub struct BackendsResponse {
    pub generation: u64,
    pub targets: Vec<TargetSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub generation: u64,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let generation = state.router.current();
    let routes = generation
        .routes()
        .iter()
        .map(|r| (r.id.clone(), r.patterns.iter().map(|p| p.path.to_string()).collect()))
        .collect();

    Json(SystemStatus {
        status: "ok",
        service: SERVICE_NAME,
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.router.uptime().as_secs(),
        environment: generation.environment().unwrap_or("development").to_string(),
        generation: generation.id(),
        routes,
    })
}

pub async fn get_routes(State(state): State<AdminState>) -> Json<RoutesResponse> {
    let generation = state.router.current();
    Json(RoutesResponse {
        generation: generation.id(),
        routes: generation.route_summaries(),
    })
}

pub async fn get_backends(State(state): State<AdminState>) -> Json<BackendsResponse> {
    let generation = state.router.current();
    Json(BackendsResponse {
        generation: generation.id(),
        targets: generation.backends().snapshot(),
    })
}

pub async fn post_reload(State(state): State<AdminState>) -> Response {
    let Some(path) = state.config_path.clone() else {
        return error_response(
            StatusCode::CONFLICT,
            "NO_CONFIG_FILE",
            "gateway was started without a config file",
        );
    };

    // Parsing and compiling are CPU-bound; keep them off the reactor.
    let router = state.router.clone();
    let result = tokio::task::spawn_blocking(move || {
        let config = load_config(&path)?;
        router.reload(config)
    })
    .await;

    match result {
        Ok(Ok(generation)) => Json(ReloadResponse { generation }).into_response(),
        Ok(Err(e @ ConfigError::Validation(_))) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, "INVALID_CONFIG", e.to_string())
        }
        Ok(Err(e)) => error_response(StatusCode::BAD_REQUEST, "CONFIG_UNREADABLE", e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.to_string()),
    }
}
