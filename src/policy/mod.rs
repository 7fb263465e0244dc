//! Policy subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     PolicyRegistry::with_builtins() (+ custom factories)
//!     → handed to GatewayRouter (no registration afterwards)
//!
//! Per generation (pipeline compilation):
//!     route policy ref (name + params)
//!     → registry.resolve(name, params)
//!     → PolicyInstance (immutable, bound to one route)
//!
//! Per request:
//!     apply(ctx)          → Continue | ShortCircuit(response)
//!     apply_response(ctx) → mutate response headers
//! ```
//!
//! # Design Decisions
//! - One trait for every policy; the set is closed at compile time
//! - Policies never perform I/O; they are synchronous and cheap
//! - Stateful policies (rate-limit buckets) keep state per instance, so a
//!   reload starts with fresh state

pub mod cors;
pub mod header_transform;
pub mod key_auth;
pub mod logging;
pub mod rate_limit;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use axum::response::Response;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::proxy::RequestContext;

pub use registry::{PolicyFactory, PolicyRegistry};

/// Attribute set by authentication policies with the caller's identity.
pub const PRINCIPAL_ATTR: &str = "auth.principal";

/// Result of running a policy on the request path.
#[derive(Debug)]
pub enum PolicyOutcome {
    /// Hand the request to the next policy (or the backend).
    Continue,
    /// Stop processing and answer with this response.
    ShortCircuit(Response),
}

/// A unit of request/response processing bound into a pipeline.
pub trait Policy: Send + Sync + fmt::Debug {
    /// Request phase. May mutate the context or short-circuit.
    fn apply(&self, ctx: &mut RequestContext) -> PolicyOutcome;

    /// Response phase, run in declaration order after the backend answers.
    fn apply_response(&self, _ctx: &RequestContext, _response: &mut Response) {}
}

/// Parameters handed to a policy factory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyParams(Map<String, Value>);

impl PolicyParams {
    pub fn new(params: Map<String, Value>) -> Self {
        Self(params)
    }

    /// Overlay `overrides` on top of `base`, key by key.
    pub fn merged(base: &Map<String, Value>, overrides: &Map<String, Value>) -> Self {
        let mut params = base.clone();
        for (key, value) in overrides {
            params.insert(key.clone(), value.clone());
        }
        Self(params)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Deserialize into a policy's typed parameter struct.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ParamError> {
        serde_json::from_value(Value::Object(self.0.clone())).map_err(|e| ParamError(e.to_string()))
    }
}

/// A policy factory rejected its parameters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ParamError(pub String);

impl ParamError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// The registry has no factory under this name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown policy '{0}'")]
pub struct UnknownPolicyError(pub String);

/// Failure to turn a policy reference into an instance.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    Unknown(#[from] UnknownPolicyError),

    #[error("invalid parameters for policy '{policy}': {source}")]
    InvalidParams {
        policy: String,
        #[source]
        source: ParamError,
    },
}

/// A resolved policy bound to its parameters.
#[derive(Clone)]
pub struct PolicyInstance {
    name: String,
    params: PolicyParams,
    policy: Arc<dyn Policy>,
}

impl PolicyInstance {
    pub(crate) fn new(name: String, params: PolicyParams, policy: Arc<dyn Policy>) -> Self {
        Self {
            name,
            params,
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &PolicyParams {
        &self.params
    }

    pub fn apply(&self, ctx: &mut RequestContext) -> PolicyOutcome {
        self.policy.apply(ctx)
    }

    pub fn apply_response(&self, ctx: &RequestContext, response: &mut Response) {
        self.policy.apply_response(ctx, response)
    }
}

impl fmt::Debug for PolicyInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyInstance")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish()
    }
}
