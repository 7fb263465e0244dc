//! Token-bucket rate limiting policy.
//!
//! Buckets live in a concurrent map keyed per client, principal or route.
//! Every `SWEEP_EVERY` checks, buckets that have refilled to capacity are
//! dropped; a fresh bucket starts full, so nothing is lost.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use dashmap::DashMap;
use serde::Deserialize;

use crate::error::error_response;
use crate::observability::metrics;
use crate::policy::{ParamError, Policy, PolicyOutcome, PolicyParams, PRINCIPAL_ATTR};
use crate::proxy::RequestContext;

pub const NAME: &str = "rate-limit";

/// Checks between sweeps of idle buckets.
const SWEEP_EVERY: u64 = 1024;

/// A simple token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    /// Tokens the bucket would hold at `now`.
    fn refilled(&self, now: Instant, capacity: f64, refill_rate: f64) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        (self.tokens + elapsed * refill_rate).min(capacity)
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// What a bucket is keyed by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyBy {
    /// Client IP address.
    #[default]
    Client,
    /// Authenticated principal, falling back to client IP.
    Principal,
    /// One bucket for the whole route.
    Global,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RateLimitParams {
    rate_per_second: f64,
    #[serde(default)]
    burst: Option<f64>,
    #[serde(default)]
    key_by: KeyBy,
}

#[derive(Debug)]
pub struct RateLimiter {
    rate_per_second: f64,
    burst: f64,
    key_by: KeyBy,
    buckets: DashMap<String, TokenBucket>,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(rate_per_second: f64, burst: f64, key_by: KeyBy) -> Self {
        Self {
            rate_per_second,
            burst,
            key_by,
            buckets: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    fn key(&self, ctx: &RequestContext) -> String {
        let client = || {
            ctx.client_addr
                .map(|a| a.ip().to_string())
                .unwrap_or_else(|| "anonymous".to_string())
        };
        match self.key_by {
            KeyBy::Client => client(),
            KeyBy::Principal => ctx
                .attribute(PRINCIPAL_ATTR)
                .map(str::to_string)
                .unwrap_or_else(client),
            KeyBy::Global => "*".to_string(),
        }
    }

    fn check(&self, key: String) -> bool {
        let allowed = self
            .buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(self.burst))
            .try_acquire(self.burst, self.rate_per_second);

        // The entry guard is released above; retain locks every shard.
        if (self.checks.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY == 0 {
            self.evict_idle();
        }
        allowed
    }

    /// Drop buckets that are back at full capacity.
    fn evict_idle(&self) {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.refilled(now, self.burst, self.rate_per_second) < self.burst);
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.buckets.len(), "Evicted idle rate-limit buckets");
        }
    }

    fn retry_after_secs(&self) -> u64 {
        (1.0 / self.rate_per_second).ceil().max(1.0) as u64
    }
}

impl Policy for RateLimiter {
    fn apply(&self, ctx: &mut RequestContext) -> PolicyOutcome {
        let key = self.key(ctx);
        if self.check(key.clone()) {
            return PolicyOutcome::Continue;
        }

        tracing::warn!(
            request_id = %ctx.request_id,
            route = %ctx.route_id(),
            client = %key,
            "Rate limit exceeded"
        );
        metrics::record_rate_limited(ctx.route_id());

        let mut response: Response = error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "rate limit exceeded",
        );
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(self.retry_after_secs()));
        PolicyOutcome::ShortCircuit(response)
    }

    fn apply_response(&self, _ctx: &RequestContext, response: &mut Response) {
        response
            .headers_mut()
            .insert("x-ratelimit-limit", HeaderValue::from(self.burst as u64));
    }
}

pub fn factory(params: &PolicyParams) -> Result<Arc<dyn Policy>, ParamError> {
    let p: RateLimitParams = params.decode()?;
    if !(p.rate_per_second.is_finite() && p.rate_per_second > 0.0) {
        return Err(ParamError::new("rate_per_second must be a positive number"));
    }
    let burst = p.burst.unwrap_or(p.rate_per_second.max(1.0));
    if !(burst.is_finite() && burst >= 1.0) {
        return Err(ParamError::new("burst must be at least 1"));
    }
    Ok(Arc::new(RateLimiter::new(p.rate_per_second, burst, p.key_by)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::Request;
    use serde_json::json;
    use std::net::SocketAddr;

    fn ctx_from(ip: &str) -> RequestContext {
        let addr: SocketAddr = format!("{ip}:5000").parse().unwrap();
        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        RequestContext::from_request(req)
    }

    #[test]
    fn test_burst_then_reject() {
        let limiter = RateLimiter::new(0.001, 2.0, KeyBy::Client);
        let mut ctx = ctx_from("10.0.0.1");
        assert!(matches!(limiter.apply(&mut ctx), PolicyOutcome::Continue));
        assert!(matches!(limiter.apply(&mut ctx), PolicyOutcome::Continue));
        match limiter.apply(&mut ctx) {
            PolicyOutcome::ShortCircuit(resp) => {
                assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
                assert!(resp.headers().contains_key(header::RETRY_AFTER));
            }
            other => panic!("expected short circuit, got {other:?}"),
        }
    }

    #[test]
    fn test_buckets_are_per_client() {
        let limiter = RateLimiter::new(0.001, 1.0, KeyBy::Client);
        assert!(matches!(limiter.apply(&mut ctx_from("10.0.0.1")), PolicyOutcome::Continue));
        assert!(matches!(limiter.apply(&mut ctx_from("10.0.0.2")), PolicyOutcome::Continue));
        assert!(matches!(
            limiter.apply(&mut ctx_from("10.0.0.1")),
            PolicyOutcome::ShortCircuit(_)
        ));
    }

    #[test]
    fn test_idle_buckets_are_evicted() {
        let limiter = RateLimiter::new(1_000.0, 1.0, KeyBy::Client);
        for i in 0..10 {
            assert!(limiter.check(format!("10.0.0.{i}")));
        }
        assert_eq!(limiter.buckets.len(), 10);

        // At 1000/s a single token is back within a millisecond.
        std::thread::sleep(std::time::Duration::from_millis(20));
        limiter.evict_idle();
        assert!(limiter.buckets.is_empty());
    }

    #[test]
    fn test_drained_buckets_survive_sweeps() {
        let limiter = RateLimiter::new(0.001, 1.0, KeyBy::Client);
        assert!(limiter.check("10.0.0.1".to_string()));
        // Enough checks from other keys to trigger several sweeps.
        for _ in 0..(SWEEP_EVERY * 2) {
            limiter.check("10.0.0.2".to_string());
        }
        assert!(limiter.buckets.contains_key("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1".to_string()));
    }

    #[test]
    fn test_principal_key() {
        let limiter = RateLimiter::new(0.001, 1.0, KeyBy::Principal);
        let mut a = ctx_from("10.0.0.1");
        a.set_attribute(PRINCIPAL_ATTR, "alice");
        let mut b = ctx_from("10.0.0.1");
        b.set_attribute(PRINCIPAL_ATTR, "bob");
        assert!(matches!(limiter.apply(&mut a), PolicyOutcome::Continue));
        assert!(matches!(limiter.apply(&mut b), PolicyOutcome::Continue));
    }

    #[test]
    fn test_factory_validation() {
        let bad = PolicyParams::new(json!({"rate_per_second": 0}).as_object().cloned().unwrap());
        assert!(factory(&bad).is_err());
        let unknown = PolicyParams::new(
            json!({"rate_per_second": 1, "per": "minute"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert!(factory(&unknown).is_err());
        let ok = PolicyParams::new(json!({"rate_per_second": 10, "key_by": "global"}).as_object().cloned().unwrap());
        assert!(factory(&ok).is_ok());
    }
}
