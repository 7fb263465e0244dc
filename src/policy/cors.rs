//! Cross-origin resource sharing policy.
//!
//! Preflight requests (`OPTIONS` with `Origin` and
//! `Access-Control-Request-Method`) are answered directly; every other
//! response from an allowed origin gets the CORS response headers.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::Response;
use serde::Deserialize;

use crate::error::error_response;
use crate::policy::{ParamError, Policy, PolicyOutcome, PolicyParams};
use crate::proxy::RequestContext;

pub const NAME: &str = "cors";

fn default_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_methods() -> Vec<String> {
    ["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CorsParams {
    #[serde(default = "default_origins")]
    allowed_origins: Vec<String>,
    #[serde(default = "default_methods")]
    allowed_methods: Vec<String>,
    /// Empty means reflect the requested headers.
    #[serde(default)]
    allowed_headers: Vec<String>,
    #[serde(default)]
    exposed_headers: Vec<String>,
    #[serde(default)]
    allow_credentials: bool,
    #[serde(default)]
    max_age_secs: Option<u64>,
}

#[derive(Debug)]
pub struct Cors {
    any_origin: bool,
    origins: Vec<String>,
    methods: HeaderValue,
    allowed_methods: Vec<Method>,
    headers: Option<HeaderValue>,
    exposed: Option<HeaderValue>,
    allow_credentials: bool,
    max_age: Option<HeaderValue>,
}

impl Cors {
    fn origin_allowed(&self, origin: &str) -> bool {
        self.any_origin || self.origins.iter().any(|o| o.eq_ignore_ascii_case(origin))
    }

    fn allow_origin_value(&self, origin: &str) -> Option<HeaderValue> {
        if self.any_origin && !self.allow_credentials {
            Some(HeaderValue::from_static("*"))
        } else {
            HeaderValue::from_str(origin).ok()
        }
    }

    fn decorate(&self, origin: &str, headers: &mut HeaderMap) {
        if let Some(value) = self.allow_origin_value(origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        if !self.any_origin || self.allow_credentials {
            headers.append(header::VARY, HeaderValue::from_static("origin"));
        }
        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }

    fn preflight(&self, ctx: &RequestContext, origin: &str, requested: &str) -> Response {
        let method_ok = Method::from_bytes(requested.trim().as_bytes())
            .map(|m| self.allowed_methods.contains(&m))
            .unwrap_or(false);
        if !self.origin_allowed(origin) || !method_ok {
            tracing::debug!(request_id = %ctx.request_id, origin = %origin, method = %requested, "CORS preflight rejected");
            return error_response(StatusCode::FORBIDDEN, "CORS_REJECTED", "origin or method not allowed");
        }

        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        let headers = response.headers_mut();
        self.decorate(origin, headers);
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, self.methods.clone());
        let allow_headers = self.headers.clone().or_else(|| {
            ctx.headers
                .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
                .cloned()
        });
        if let Some(value) = allow_headers {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
        }
        if let Some(max_age) = &self.max_age {
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, max_age.clone());
        }
        response
    }
}

impl Policy for Cors {
    fn apply(&self, ctx: &mut RequestContext) -> PolicyOutcome {
        if ctx.method != Method::OPTIONS {
            return PolicyOutcome::Continue;
        }
        match (
            ctx.header(header::ORIGIN.as_str()),
            ctx.header(header::ACCESS_CONTROL_REQUEST_METHOD.as_str()),
        ) {
            (Some(origin), Some(requested)) => {
                PolicyOutcome::ShortCircuit(self.preflight(ctx, origin, requested))
            }
            _ => PolicyOutcome::Continue,
        }
    }

    fn apply_response(&self, ctx: &RequestContext, response: &mut Response) {
        let Some(origin) = ctx.header(header::ORIGIN.as_str()) else {
            return;
        };
        if !self.origin_allowed(origin) {
            return;
        }
        let headers = response.headers_mut();
        if headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN) {
            return;
        }
        self.decorate(origin, headers);
        if let Some(exposed) = &self.exposed {
            headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, exposed.clone());
        }
    }
}

fn join_header(values: &[String], what: &str) -> Result<Option<HeaderValue>, ParamError> {
    if values.is_empty() {
        return Ok(None);
    }
    HeaderValue::from_str(&values.join(", "))
        .map(Some)
        .map_err(|_| ParamError::new(format!("invalid {what}")))
}

pub fn factory(params: &PolicyParams) -> Result<Arc<dyn Policy>, ParamError> {
    let p: CorsParams = params.decode()?;
    if p.allowed_origins.is_empty() {
        return Err(ParamError::new("allowed_origins must not be empty"));
    }

    let allowed_methods = p
        .allowed_methods
        .iter()
        .map(|m| {
            Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                .map_err(|_| ParamError::new(format!("invalid method '{m}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let methods = join_header(
        &allowed_methods.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "allowed_methods",
    )?
    .ok_or_else(|| ParamError::new("allowed_methods must not be empty"))?;

    Ok(Arc::new(Cors {
        any_origin: p.allowed_origins.iter().any(|o| o == "*"),
        origins: p.allowed_origins,
        methods,
        allowed_methods,
        headers: join_header(&p.allowed_headers, "allowed_headers")?,
        exposed: join_header(&p.exposed_headers, "exposed_headers")?,
        allow_credentials: p.allow_credentials,
        max_age: p.max_age_secs.map(HeaderValue::from),
    }))
}
