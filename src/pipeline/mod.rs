//! Per-route policy pipelines.
//!
//! # Data Flow
//! ```text
//! Generation build:
//!     Route.policies (name + merged params)
//!     → PipelineBuilder::compile (registry.resolve, in declaration order)
//!     → CompiledPipeline (cached per route for the generation's lifetime)
//!
//! Per request:
//!     run_request  → every policy's request phase until one short-circuits
//!     run_response → every policy's response phase, declaration order
//! ```
//!
//! # Design Decisions
//! - Compilation is all-or-nothing per route; one bad policy disables the route
//! - Compiling the same route twice yields equivalent pipelines
//! - A short-circuit response still gets the response phase of the policies
//!   that ran before it

use axum::response::Response;
use thiserror::Error;

use crate::config::Route;
use crate::observability::metrics;
use crate::policy::{PolicyInstance, PolicyOutcome, PolicyRegistry, ResolveError};
use crate::proxy::RequestContext;

/// A route's policy list could not be turned into a pipeline.
#[derive(Debug, Clone, Error)]
#[error("route '{route}': policy #{index} '{policy}': {source}")]
pub struct PolicyCompileError {
    pub route: String,
    pub index: usize,
    pub policy: String,
    #[source]
    pub source: ResolveError,
}

/// Ordered policy instances bound to one route.
#[derive(Debug, Clone)]
pub struct CompiledPipeline {
    route_id: String,
    policies: Vec<PolicyInstance>,
}

impl CompiledPipeline {
    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    pub fn policies(&self) -> &[PolicyInstance] {
        &self.policies
    }

    pub fn policy_names(&self) -> Vec<&str> {
        self.policies.iter().map(PolicyInstance::name).collect()
    }

    /// Request phase. `Err` carries the terminal response of a short-circuit,
    /// already passed through the response phase of the earlier policies.
    pub fn run_request(&self, ctx: &mut RequestContext) -> Result<(), Response> {
        for (index, policy) in self.policies.iter().enumerate() {
            match policy.apply(ctx) {
                PolicyOutcome::Continue => {}
                PolicyOutcome::ShortCircuit(mut response) => {
                    tracing::debug!(
                        request_id = %ctx.request_id,
                        route = %self.route_id,
                        policy = %policy.name(),
                        status = response.status().as_u16(),
                        "Policy short-circuited request"
                    );
                    metrics::record_short_circuit(&self.route_id, policy.name());
                    for passed in &self.policies[..index] {
                        passed.apply_response(ctx, &mut response);
                    }
                    return Err(response);
                }
            }
        }
        Ok(())
    }

    /// Response phase for a backend response.
    pub fn run_response(&self, ctx: &RequestContext, response: &mut Response) {
        for policy in &self.policies {
            policy.apply_response(ctx, response);
        }
    }
}

/// Resolves route policy references against a registry.
#[derive(Debug, Clone, Copy)]
pub struct PipelineBuilder<'a> {
    registry: &'a PolicyRegistry,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(registry: &'a PolicyRegistry) -> Self {
        Self { registry }
    }

    pub fn compile(&self, route: &Route) -> Result<CompiledPipeline, PolicyCompileError> {
        let policies = route
            .policies
            .iter()
            .enumerate()
            .map(|(index, policy)| {
                self.registry
                    .resolve(&policy.name, policy.params.clone())
                    .map_err(|source| PolicyCompileError {
                        route: route.id.clone(),
                        index,
                        policy: policy.name.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledPipeline {
            route_id: route.id.clone(),
            policies,
        })
    }
}
