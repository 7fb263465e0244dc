//! Header rewriting on the request and response paths.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use serde::Deserialize;

use crate::policy::{ParamError, Policy, PolicyOutcome, PolicyParams};
use crate::proxy::RequestContext;

pub const NAME: &str = "header-transform";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleParams {
    #[serde(default)]
    set: BTreeMap<String, String>,
    #[serde(default)]
    remove: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TransformParams {
    #[serde(default)]
    request: RuleParams,
    #[serde(default)]
    response: RuleParams,
}

/// Compiled header edits: removals first, then sets.
#[derive(Debug, Default)]
struct HeaderRules {
    set: Vec<(HeaderName, HeaderValue)>,
    remove: Vec<HeaderName>,
}

impl HeaderRules {
    fn compile(params: RuleParams) -> Result<Self, ParamError> {
        let mut rules = HeaderRules::default();
        for name in params.remove {
            rules.remove.push(parse_name(&name)?);
        }
        for (name, value) in params.set {
            let value = HeaderValue::from_str(&value)
                .map_err(|_| ParamError::new(format!("invalid value for header '{name}'")))?;
            rules.set.push((parse_name(&name)?, value));
        }
        Ok(rules)
    }

    fn apply(&self, headers: &mut HeaderMap) {
        for name in &self.remove {
            headers.remove(name);
        }
        for (name, value) in &self.set {
            headers.insert(name.clone(), value.clone());
        }
    }

    fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

fn parse_name(name: &str) -> Result<HeaderName, ParamError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ParamError::new(format!("invalid header name '{name}'")))
}

#[derive(Debug)]
pub struct HeaderTransform {
    request: HeaderRules,
    response: HeaderRules,
}

impl Policy for HeaderTransform {
    fn apply(&self, ctx: &mut RequestContext) -> PolicyOutcome {
        self.request.apply(&mut ctx.headers);
        PolicyOutcome::Continue
    }

    fn apply_response(&self, _ctx: &RequestContext, response: &mut Response) {
        self.response.apply(response.headers_mut());
    }
}

pub fn factory(params: &PolicyParams) -> Result<Arc<dyn Policy>, ParamError> {
    let p: TransformParams = params.decode()?;
    let transform = HeaderTransform {
        request: HeaderRules::compile(p.request)?,
        response: HeaderRules::compile(p.response)?,
    };
    if transform.request.is_empty() && transform.response.is_empty() {
        return Err(ParamError::new("no header rules configured"));
    }
    Ok(Arc::new(transform))
}
