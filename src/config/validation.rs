//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing, non-empty groups)
//! - Validate value ranges (timeouts > 0, thresholds >= 1)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Checks that need the policy registry or the pattern grammar run in
//!   `ConfigModel::load` and report through the same error type

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a configuration document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("route id cannot be empty")]
    EmptyRouteId,

    #[error("route '{0}' is declared more than once")]
    DuplicateRoute(String),

    #[error("route '{0}' has no path patterns")]
    NoPatterns(String),

    #[error("route '{route}' references unknown backend group '{group}'")]
    UnknownBackendGroup { route: String, group: String },

    #[error("route '{route}' references backend group '{group}' which has no targets")]
    EmptyBackendGroup { route: String, group: String },

    #[error("route '{route}' has an invalid path pattern '{pattern}': {reason}")]
    InvalidPattern {
        route: String,
        pattern: String,
        reason: String,
    },

    #[error("route '{route}' has an invalid method '{method}'")]
    InvalidMethod { route: String, method: String },

    #[error("route '{route}' references unknown policy '{policy}'")]
    UnknownPolicy { route: String, policy: String },

    #[error("route '{route}' references unknown policy parameter set '{set}'")]
    UnknownParamSet { route: String, set: String },

    #[error("route '{0}' has a zero timeout")]
    ZeroRouteTimeout(String),

    #[error("backend group '{0}' is declared more than once")]
    DuplicateBackendGroup(String),

    #[error("backend group '{group}' has an invalid target '{target}': {reason}")]
    InvalidTarget {
        group: String,
        target: String,
        reason: String,
    },

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

/// Run every structural check and return all violations.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroValue("timeouts.request_secs"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroValue("timeouts.connect_secs"));
    }
    if config.health_check.failure_threshold == 0 {
        errors.push(ValidationError::ZeroValue("health_check.failure_threshold"));
    }
    if config.health_check.enabled && config.health_check.interval_secs == 0 {
        errors.push(ValidationError::ZeroValue("health_check.interval_secs"));
    }
    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::ZeroValue("retries.max_attempts"));
    }

    let mut group_names = HashSet::new();
    for group in &config.backend_groups {
        if !group_names.insert(group.name.as_str()) {
            errors.push(ValidationError::DuplicateBackendGroup(group.name.clone()));
        }
        for target in &group.targets {
            if let Err(reason) = check_target(target) {
                errors.push(ValidationError::InvalidTarget {
                    group: group.name.clone(),
                    target: target.clone(),
                    reason,
                });
            }
        }
    }

    let mut route_ids = HashSet::new();
    for route in &config.routes {
        if route.id.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteId);
        } else if !route_ids.insert(route.id.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.id.clone()));
        }

        if route.patterns.is_empty() {
            errors.push(ValidationError::NoPatterns(route.id.clone()));
        }

        if route.timeout_ms == Some(0) {
            errors.push(ValidationError::ZeroRouteTimeout(route.id.clone()));
        }

        match config
            .backend_groups
            .iter()
            .find(|g| g.name == route.backend_group)
        {
            None => errors.push(ValidationError::UnknownBackendGroup {
                route: route.id.clone(),
                group: route.backend_group.clone(),
            }),
            Some(group) if group.targets.is_empty() => {
                errors.push(ValidationError::EmptyBackendGroup {
                    route: route.id.clone(),
                    group: group.name.clone(),
                })
            }
            Some(_) => {}
        }

        for policy in &route.policies {
            if let Some(set) = &policy.params_from {
                if !config.policy_params.contains_key(set) {
                    errors.push(ValidationError::UnknownParamSet {
                        route: route.id.clone(),
                        set: set.clone(),
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_target(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    if url.query().is_some() {
        return Err("query strings are not allowed in targets".to_string());
    }
    Ok(())
}
