//! Per-request processing record.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, HeaderValue, Method, Request, Uri, Version},
};

use crate::config::model::Route;

/// Header carrying the correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Everything one inbound request carries through matching, policies and
/// forwarding. Owned by a single request task.
#[derive(Debug)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Body,
    pub client_addr: Option<SocketAddr>,
    /// Free-form annotations written by policies.
    pub attributes: HashMap<String, String>,
    pub route: Option<Arc<Route>>,
    pub path_params: HashMap<String, String>,
    started: Instant,
}

impl RequestContext {
    /// Take ownership of an inbound request. A request id is generated when
    /// the `x-request-id` header is missing.
    pub fn from_request(request: Request<Body>) -> Self {
        let (mut parts, body) = request.into_parts();

        let client_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let request_id = match parts.headers.get(X_REQUEST_ID).and_then(|v| v.to_str().ok()) {
            Some(id) => id.to_string(),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                if let Ok(value) = HeaderValue::from_str(&id) {
                    parts.headers.insert(X_REQUEST_ID, value);
                }
                id
            }
        };

        Self {
            request_id,
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            client_addr,
            attributes: HashMap::new(),
            route: None,
            path_params: HashMap::new(),
            started: Instant::now(),
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Host from the `Host` header, falling back to the URI authority
    /// (HTTP/2 requests carry it there).
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn route_id(&self) -> &str {
        self.route.as_ref().map(|r| r.id.as_str()).unwrap_or("none")
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Record the matched route and its captured parameters.
    pub fn bind_route(&mut self, route: Arc<Route>, params: HashMap<String, String>) {
        self.route = Some(route);
        self.path_params = params;
    }

    /// Move the body out, leaving an empty one behind.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn started(&self) -> Instant {
        self.started
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_request_id() {
        let req = Request::builder()
            .uri("/orders/1?expand=items")
            .header("host", "api.example.com")
            .body(Body::empty())
            .unwrap();
        let ctx = RequestContext::from_request(req);
        assert!(!ctx.request_id.is_empty());
        assert_eq!(ctx.header(X_REQUEST_ID), Some(ctx.request_id.as_str()));
        assert_eq!(ctx.path(), "/orders/1");
        assert_eq!(ctx.query(), Some("expand=items"));
        assert_eq!(ctx.host(), Some("api.example.com"));
        assert_eq!(ctx.route_id(), "none");
    }

    #[test]
    fn test_keeps_incoming_request_id() {
        let req = Request::builder()
            .uri("http://h2.example.com/x")
            .header(X_REQUEST_ID, "abc-123")
            .body(Body::empty())
            .unwrap();
        let ctx = RequestContext::from_request(req);
        assert_eq!(ctx.request_id, "abc-123");
        assert_eq!(ctx.host(), Some("h2.example.com"));
    }
}
