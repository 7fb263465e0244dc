use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::admin::AdminState;
use crate::error::error_response;

/// Require `Authorization: Bearer <admin.api_key>`.
pub async fn admin_auth_middleware(
    State(state): State<AdminState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|key| !state.api_key.is_empty() && key == &*state.api_key);

    if authorized {
        return next.run(request).await;
    }
    tracing::warn!(path = %request.uri().path(), "Rejected admin request");
    error_response(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "missing or invalid admin key")
}
