//! Per-request gateway errors.
//!
//! Configuration-time failures live in `config::ConfigError` and
//! `pipeline::PolicyCompileError`; everything here is recovered locally into
//! an error response and never stops the serving process.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Runtime failures while serving one request.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("upstream {target} did not answer within {timeout:?}")]
    Timeout { target: String, timeout: Duration },

    #[error("connection to upstream {target} failed: {reason}")]
    ConnectionRefused { target: String, reason: String },

    #[error("no live targets in backend group '{0}'")]
    ServiceUnavailable(String),

    #[error("route '{route}' is disabled: {reason}")]
    RouteDisabled { route: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::ConnectionRefused { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::ServiceUnavailable(_) | GatewayError::RouteDisabled { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Timeout { .. } => "UPSTREAM_TIMEOUT",
            GatewayError::ConnectionRefused { .. } => "UPSTREAM_UNREACHABLE",
            GatewayError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            GatewayError::RouteDisabled { .. } => "ROUTE_DISABLED",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        // Upstream addresses stay in the logs, not in client responses.
        let message = match &self {
            GatewayError::Timeout { .. } => "upstream request timed out".to_string(),
            GatewayError::ConnectionRefused { .. } => "upstream request failed".to_string(),
            GatewayError::Internal(_) => "internal gateway error".to_string(),
            other => other.to_string(),
        };
        error_response(self.status(), self.code(), message)
    }
}

/// JSON error body shared by the gateway and built-in policies.
pub fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    let body = Json(json!({
        "error": {
            "code": code,
            "message": message.into(),
        }
    }));
    (status, body).into_response()
}
