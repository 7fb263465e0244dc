//! Access logging policy.

use std::sync::Arc;

use axum::response::Response;
use serde::Deserialize;
use tracing::Level;

use crate::policy::{ParamError, Policy, PolicyOutcome, PolicyParams, PRINCIPAL_ATTR};
use crate::proxy::RequestContext;

pub const NAME: &str = "logging";

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingParams {
    #[serde(default = "default_level")]
    level: String,
    /// Also emit an event when the request enters the pipeline.
    #[serde(default)]
    log_request: bool,
}

#[derive(Debug)]
pub struct AccessLog {
    level: Level,
    log_request: bool,
}

// `tracing` macros need the level as a constant.
macro_rules! event_at {
    ($level:expr, $($args:tt)+) => {
        match $level {
            Level::TRACE => tracing::trace!($($args)+),
            Level::DEBUG => tracing::debug!($($args)+),
            Level::INFO => tracing::info!($($args)+),
            Level::WARN => tracing::warn!($($args)+),
            _ => tracing::error!($($args)+),
        }
    };
}

impl Policy for AccessLog {
    fn apply(&self, ctx: &mut RequestContext) -> PolicyOutcome {
        if self.log_request {
            event_at!(
                self.level,
                request_id = %ctx.request_id,
                route = %ctx.route_id(),
                method = %ctx.method,
                path = %ctx.path(),
                "Request received"
            );
        }
        PolicyOutcome::Continue
    }

    fn apply_response(&self, ctx: &RequestContext, response: &mut Response) {
        event_at!(
            self.level,
            request_id = %ctx.request_id,
            route = %ctx.route_id(),
            method = %ctx.method,
            path = %ctx.path(),
            principal = ctx.attribute(PRINCIPAL_ATTR).unwrap_or("-"),
            status = response.status().as_u16(),
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "Request completed"
        );
    }
}

pub fn factory(params: &PolicyParams) -> Result<Arc<dyn Policy>, ParamError> {
    let p: LoggingParams = params.decode()?;
    let level = p
        .level
        .parse::<Level>()
        .map_err(|_| ParamError::new(format!("invalid log level '{}'", p.level)))?;
    Ok(Arc::new(AccessLog {
        level,
        log_request: p.log_request,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_levels() {
        let ok = PolicyParams::new(json!({"level": "debug"}).as_object().cloned().unwrap());
        assert!(factory(&ok).is_ok());
        assert!(factory(&PolicyParams::default()).is_ok());

        let bad = PolicyParams::new(json!({"level": "loud"}).as_object().cloned().unwrap());
        assert!(factory(&bad).is_err());
    }
}
