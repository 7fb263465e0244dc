//! One immutable configuration generation.
//!
//! A generation bundles everything a request needs: the route matcher, the
//! compiled pipelines, the backend groups with their liveness state, and the
//! dispatcher. Requests hold an `Arc<Generation>` for their whole lifetime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::schema::{HealthCheckConfig, TimeoutConfig};
use crate::config::{ConfigError, ConfigModel, GatewayConfig, Route};
use crate::error::{error_response, GatewayError};
use crate::load_balancer::BackendGroups;
use crate::observability::metrics;
use crate::pipeline::{CompiledPipeline, PipelineBuilder, PolicyCompileError};
use crate::policy::PolicyRegistry;
use crate::proxy::{ProxyDispatcher, RequestContext};
use crate::routing::RouteMatcher;

/// Route listing for the status surface and admin API.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub id: String,
    pub patterns: Vec<String>,
    pub methods: Vec<Vec<String>>,
    pub policies: Vec<String>,
    pub backend_group: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
}

#[derive(Debug)]
pub struct Generation {
    id: u64,
    loaded_at: DateTime<Utc>,
    environment: Option<String>,
    model: ConfigModel,
    matcher: RouteMatcher,
    pipelines: HashMap<String, Result<Arc<CompiledPipeline>, PolicyCompileError>>,
    backends: BackendGroups,
    dispatcher: ProxyDispatcher,
}

impl Generation {
    /// Load, validate and compile `config`. Routes whose pipeline fails to
    /// compile are kept but disabled.
    pub fn build(
        id: u64,
        config: GatewayConfig,
        registry: &PolicyRegistry,
    ) -> Result<Self, ConfigError> {
        let environment = config.environment.clone();
        let model = ConfigModel::load(config, registry)?;

        let builder = PipelineBuilder::new(registry);
        let pipelines = model
            .routes
            .iter()
            .map(|route| {
                let compiled = builder.compile(route).map(Arc::new);
                if let Err(e) = &compiled {
                    tracing::error!(generation = id, route = %route.id, error = %e, "Route disabled");
                }
                (route.id.clone(), compiled)
            })
            .collect();

        let matcher = RouteMatcher::new(&model.routes);
        let backends = BackendGroups::new(
            &model.backend_groups,
            model.health_check.failure_threshold,
            Duration::from_millis(model.health_check.dead_cooldown_ms),
        );
        let dispatcher = ProxyDispatcher::new(&model.timeouts, &model.retries);

        Ok(Self {
            id,
            loaded_at: Utc::now(),
            environment,
            model,
            matcher,
            pipelines,
            backends,
            dispatcher,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.model.routes
    }

    pub fn backends(&self) -> &BackendGroups {
        &self.backends
    }

    pub fn health_check(&self) -> &HealthCheckConfig {
        &self.model.health_check
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.model.timeouts
    }

    pub fn pipeline(&self, route_id: &str) -> Option<&Result<Arc<CompiledPipeline>, PolicyCompileError>> {
        self.pipelines.get(route_id)
    }

    pub fn route_summaries(&self) -> Vec<RouteSummary> {
        self.model
            .routes
            .iter()
            .map(|route| {
                let compiled = self.pipelines.get(&route.id);
                RouteSummary {
                    id: route.id.clone(),
                    patterns: route.patterns.iter().map(|p| p.path.to_string()).collect(),
                    methods: route
                        .patterns
                        .iter()
                        .map(|p| p.methods.iter().map(ToString::to_string).collect())
                        .collect(),
                    policies: route.policies.iter().map(|p| p.name.clone()).collect(),
                    backend_group: route.backend_group.clone(),
                    enabled: matches!(compiled, Some(Ok(_))),
                    disabled_reason: match compiled {
                        Some(Err(e)) => Some(e.to_string()),
                        _ => None,
                    },
                }
            })
            .collect()
    }

    /// Match, run the pipeline and dispatch one request.
    pub async fn serve(&self, request: Request<Body>) -> Response {
        let mut ctx = RequestContext::from_request(request);
        let method = ctx.method.to_string();

        let Some(found) = self.matcher.find(&ctx.method, ctx.host(), ctx.path()) else {
            tracing::debug!(request_id = %ctx.request_id, method = %method, path = %ctx.path(), "No route matched");
            let response = error_response(
                StatusCode::NOT_FOUND,
                "ROUTE_NOT_FOUND",
                format!("no route for {} {}", method, ctx.path()),
            );
            metrics::record_request("none", &method, response.status().as_u16(), ctx.started());
            return response;
        };
        ctx.bind_route(found.route.clone(), found.params);
        let route = found.route;

        let response = match self.pipelines.get(&route.id) {
            Some(Ok(pipeline)) => match self.backends.get(&route.backend_group) {
                Some(group) => match self.dispatcher.dispatch(&mut ctx, pipeline, group).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::debug!(request_id = %ctx.request_id, route = %route.id, error = %e, "Dispatch failed");
                        let mut response = e.into_response();
                        pipeline.run_response(&ctx, &mut response);
                        response
                    }
                },
                None => GatewayError::Internal(format!(
                    "backend group '{}' missing from generation",
                    route.backend_group
                ))
                .into_response(),
            },
            Some(Err(e)) => GatewayError::RouteDisabled {
                route: route.id.clone(),
                reason: e.to_string(),
            }
            .into_response(),
            None => GatewayError::Internal(format!("no pipeline for route '{}'", route.id))
                .into_response(),
        };

        metrics::record_request(&route.id, &method, response.status().as_u16(), ctx.started());
        response
    }
}
