//! API-key authentication policy.
//!
//! Accepts requests that carry a configured key in either:
//! - the key header (`x-api-key` unless overridden)
//! - `Authorization: Bearer <key>` (unless `allow_bearer = false`)
//! - a query parameter, when `query_param` is set
//!
//! Requests without a valid key receive `401 Unauthorized`. On success the
//! key's principal is written to the `auth.principal` attribute.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use serde::Deserialize;

use crate::error::error_response;
use crate::policy::{ParamError, Policy, PolicyOutcome, PolicyParams, PRINCIPAL_ATTR};
use crate::proxy::RequestContext;

pub const NAME: &str = "key-auth";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KeyEntry {
    Bare(String),
    Named { key: String, principal: String },
}

fn default_header() -> String {
    "x-api-key".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyAuthParams {
    keys: Vec<KeyEntry>,
    #[serde(default = "default_header")]
    header: String,
    #[serde(default = "default_true")]
    allow_bearer: bool,
    #[serde(default)]
    query_param: Option<String>,
    /// Remove the credential header before forwarding.
    #[serde(default)]
    hide_credentials: bool,
}

#[derive(Debug)]
pub struct KeyAuth {
    /// key → principal
    keys: HashMap<String, String>,
    header: HeaderName,
    allow_bearer: bool,
    query_param: Option<String>,
    hide_credentials: bool,
}

impl KeyAuth {
    fn extract_key(&self, ctx: &RequestContext) -> Option<(String, Option<HeaderName>)> {
        if let Some(key) = ctx.headers.get(&self.header).and_then(|v| v.to_str().ok()) {
            return Some((key.trim().to_string(), Some(self.header.clone())));
        }
        if self.allow_bearer {
            let bearer = ctx
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "));
            if let Some(key) = bearer {
                return Some((key.trim().to_string(), Some(header::AUTHORIZATION)));
            }
        }
        let param = self.query_param.as_deref()?;
        url::form_urlencoded::parse(ctx.query()?.as_bytes())
            .find(|(name, _)| name == param)
            .map(|(_, value)| (value.into_owned(), None))
    }

    fn unauthorized(message: &str) -> PolicyOutcome {
        let mut response = error_response(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message);
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("apikey"));
        PolicyOutcome::ShortCircuit(response)
    }
}

impl Policy for KeyAuth {
    fn apply(&self, ctx: &mut RequestContext) -> PolicyOutcome {
        match self.extract_key(ctx) {
            Some((key, source)) => match self.keys.get(&key) {
                Some(principal) => {
                    ctx.set_attribute(PRINCIPAL_ATTR, principal.clone());
                    if self.hide_credentials {
                        if let Some(name) = source {
                            ctx.headers.remove(name);
                        }
                    }
                    PolicyOutcome::Continue
                }
                None => {
                    tracing::warn!(request_id = %ctx.request_id, route = %ctx.route_id(), "Rejected request: invalid API key");
                    Self::unauthorized("invalid API key")
                }
            },
            None => {
                tracing::warn!(request_id = %ctx.request_id, route = %ctx.route_id(), "Rejected request: missing API key");
                Self::unauthorized("missing API key")
            }
        }
    }
}

pub fn factory(params: &PolicyParams) -> Result<Arc<dyn Policy>, ParamError> {
    let p: KeyAuthParams = params.decode()?;
    if p.keys.is_empty() {
        return Err(ParamError::new("keys must not be empty"));
    }

    let header = HeaderName::from_bytes(p.header.as_bytes())
        .map_err(|_| ParamError::new(format!("invalid header name '{}'", p.header)))?;

    let mut keys = HashMap::new();
    for (i, entry) in p.keys.into_iter().enumerate() {
        let (key, principal) = match entry {
            KeyEntry::Bare(key) => (key, format!("key#{i}")),
            KeyEntry::Named { key, principal } => (key, principal),
        };
        if key.is_empty() {
            return Err(ParamError::new(format!("key #{i} is empty")));
        }
        keys.insert(key, principal);
    }

    Ok(Arc::new(KeyAuth {
        keys,
        header,
        allow_bearer: p.allow_bearer,
        query_param: p.query_param,
        hide_credentials: p.hide_credentials,
    }))
}
