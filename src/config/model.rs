//! Typed, validated in-memory configuration for one generation.
//!
//! `ConfigModel::load` turns a deserialized `GatewayConfig` into routes with
//! parsed patterns and resolved parameter sets. It either succeeds completely
//! or returns every problem found; there is no partially loaded model.

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use url::Url;

use crate::config::loader::ConfigError;
use crate::config::schema::{
    GatewayConfig, HealthCheckConfig, RetryConfig, Strategy, TimeoutConfig,
};
use crate::config::validation::{validate_config, ValidationError};
use crate::policy::{PolicyParams, PolicyRegistry};
use crate::routing::pattern::{HostPattern, PathPattern};

/// A configured route.
#[derive(Debug)]
pub struct Route {
    pub id: String,
    pub patterns: Vec<RoutePattern>,
    pub policies: Vec<PolicyRef>,
    pub backend_group: String,
    pub timeout: Option<Duration>,
}

/// One path pattern with its method and host constraints.
#[derive(Debug)]
pub struct RoutePattern {
    /// Empty means any method.
    pub methods: Vec<Method>,
    pub host: Option<HostPattern>,
    pub path: PathPattern,
}

impl RoutePattern {
    pub fn accepts_method(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    pub fn accepts_host(&self, host: Option<&str>) -> bool {
        match (&self.host, host) {
            (None, _) => true,
            (Some(pattern), Some(host)) => pattern.matches(host),
            (Some(_), None) => false,
        }
    }
}

/// A policy reference with its final (merged) parameters.
#[derive(Debug, Clone)]
pub struct PolicyRef {
    pub name: String,
    pub params: PolicyParams,
}

#[derive(Debug, Clone)]
pub struct BackendGroupSpec {
    pub name: String,
    pub targets: Vec<Url>,
    pub strategy: Strategy,
}

/// Everything a generation is built from.
#[derive(Debug)]
pub struct ConfigModel {
    pub routes: Vec<Arc<Route>>,
    pub backend_groups: Vec<BackendGroupSpec>,
    pub timeouts: TimeoutConfig,
    pub retries: RetryConfig,
    pub health_check: HealthCheckConfig,
}

impl ConfigModel {
    /// Validate `config` against the registry and build the model.
    pub fn load(config: GatewayConfig, registry: &PolicyRegistry) -> Result<Self, ConfigError> {
        let mut errors = validate_config(&config).err().unwrap_or_default();

        let mut routes = Vec::with_capacity(config.routes.len());
        for route in &config.routes {
            let mut patterns = Vec::with_capacity(route.patterns.len());
            for pattern in &route.patterns {
                let path = match PathPattern::parse(&pattern.path) {
                    Ok(path) => path,
                    Err(e) => {
                        errors.push(ValidationError::InvalidPattern {
                            route: route.id.clone(),
                            pattern: pattern.path.clone(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };

                let mut methods = Vec::with_capacity(pattern.methods.len());
                for raw in &pattern.methods {
                    match Method::from_bytes(raw.to_ascii_uppercase().as_bytes()) {
                        Ok(m) => methods.push(m),
                        Err(_) => errors.push(ValidationError::InvalidMethod {
                            route: route.id.clone(),
                            method: raw.clone(),
                        }),
                    }
                }

                patterns.push(RoutePattern {
                    methods,
                    host: pattern.host.as_deref().map(HostPattern::new),
                    path,
                });
            }

            let mut policies = Vec::with_capacity(route.policies.len());
            for policy in &route.policies {
                if !registry.contains(&policy.name) {
                    errors.push(ValidationError::UnknownPolicy {
                        route: route.id.clone(),
                        policy: policy.name.clone(),
                    });
                    continue;
                }
                let empty = serde_json::Map::new();
                let base = policy
                    .params_from
                    .as_ref()
                    .and_then(|set| config.policy_params.get(set))
                    .unwrap_or(&empty);
                policies.push(PolicyRef {
                    name: policy.name.clone(),
                    params: PolicyParams::merged(base, &policy.params),
                });
            }

            routes.push(Arc::new(Route {
                id: route.id.clone(),
                patterns,
                policies,
                backend_group: route.backend_group.clone(),
                timeout: route.timeout_ms.map(Duration::from_millis),
            }));
        }

        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }

        // Target URLs were checked by validate_config.
        let backend_groups = config
            .backend_groups
            .iter()
            .map(|g| BackendGroupSpec {
                name: g.name.clone(),
                targets: g.targets.iter().filter_map(|t| Url::parse(t).ok()).collect(),
                strategy: g.strategy,
            })
            .collect();

        Ok(Self {
            routes,
            backend_groups,
            timeouts: config.timeouts,
            retries: config.retries,
            health_check: config.health_check,
        })
    }

    pub fn route(&self, id: &str) -> Option<&Arc<Route>> {
        self.routes.iter().find(|r| r.id == id)
    }
}
