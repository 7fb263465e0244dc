//! Policy registration table.
//!
//! # Responsibilities
//! - Map policy names to factories
//! - Resolve a (name, params) pair into a `PolicyInstance`
//!
//! # Design Decisions
//! - Populated once at startup; `GatewayRouter` takes ownership, so nothing
//!   can register at request time
//! - Lookup by name with a checked failure path, no dynamic loading

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::policy::{
    cors, header_transform, key_auth, logging, rate_limit, ParamError, Policy, PolicyInstance,
    PolicyParams, ResolveError, UnknownPolicyError,
};

/// Builds a policy from its parameters.
pub type PolicyFactory =
    Arc<dyn Fn(&PolicyParams) -> Result<Arc<dyn Policy>, ParamError> + Send + Sync>;

/// Name → factory table.
#[derive(Default, Clone)]
pub struct PolicyRegistry {
    factories: HashMap<String, PolicyFactory>,
}

impl PolicyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in policy set.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(rate_limit::NAME, rate_limit::factory);
        registry.register(key_auth::NAME, key_auth::factory);
        registry.register(header_transform::NAME, header_transform::factory);
        registry.register(cors::NAME, cors::factory);
        registry.register(logging::NAME, logging::factory);
        registry
    }

    /// Register a factory, replacing any previous one with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&PolicyParams) -> Result<Arc<dyn Policy>, ParamError> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.insert(name.clone(), Arc::new(factory)).is_some() {
            tracing::warn!(policy = %name, "Policy factory replaced");
        } else {
            tracing::debug!(policy = %name, "Policy factory registered");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build a policy instance.
    pub fn resolve(&self, name: &str, params: PolicyParams) -> Result<PolicyInstance, ResolveError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| UnknownPolicyError(name.to_string()))?;

        let policy = factory(&params).map_err(|source| ResolveError::InvalidParams {
            policy: name.to_string(),
            source,
        })?;

        Ok(PolicyInstance::new(name.to_string(), params, policy))
    }
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("policies", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyOutcome;
    use crate::proxy::RequestContext;
    use serde_json::json;

    #[derive(Debug)]
    struct Noop;

    impl Policy for Noop {
        fn apply(&self, _ctx: &mut RequestContext) -> PolicyOutcome {
            PolicyOutcome::Continue
        }
    }

    fn params(v: serde_json::Value) -> PolicyParams {
        match v {
            serde_json::Value::Object(m) => PolicyParams::new(m),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = PolicyRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec!["cors", "header-transform", "key-auth", "logging", "rate-limit"]
        );
    }

    #[test]
    fn test_unknown_policy() {
        let registry = PolicyRegistry::with_builtins();
        let err = registry.resolve("jwt", PolicyParams::default()).unwrap_err();
        assert_eq!(err, ResolveError::Unknown(UnknownPolicyError("jwt".into())));
    }

    #[test]
    fn test_invalid_params() {
        let registry = PolicyRegistry::with_builtins();
        let err = registry
            .resolve("rate-limit", params(json!({"rate_per_second": -1})))
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidParams { ref policy, .. } if policy == "rate-limit"));
    }

    #[test]
    fn test_custom_factory() {
        let mut registry = PolicyRegistry::new();
        registry.register("noop", |_params: &PolicyParams| Ok(Arc::new(Noop) as Arc<dyn Policy>));
        let instance = registry.resolve("noop", PolicyParams::default()).unwrap();
        assert_eq!(instance.name(), "noop");
    }
}
