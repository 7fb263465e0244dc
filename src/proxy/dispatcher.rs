//! Upstream dispatch.
//!
//! # Responsibilities
//! - Run the route's request phase, honoring short-circuits
//! - Select a live target from the backend group
//! - Forward with a deadline, retry connection failures when safe
//! - Feed outcomes back into target liveness
//! - Stream the upstream response back through the response phase
//!
//! # Design Decisions
//! - One client (and connection pool) per generation
//! - The deadline covers connect + response headers, then bounds the gap
//!   between response body frames
//! - A response body holds its target's in-flight slot until it ends
//! - Only timeouts, stalled bodies and connection errors count as target
//!   failures

use std::io;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{header, Request, Uri},
    response::Response,
    BoxError,
};
use futures_util::{stream, StreamExt};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::config::schema::{RetryConfig, TimeoutConfig};
use crate::error::GatewayError;
use crate::load_balancer::{BackendGroup, Target, TargetGuard};
use crate::observability::metrics;
use crate::pipeline::CompiledPipeline;
use crate::proxy::context::RequestContext;
use crate::proxy::headers::{add_forwarded, strip_hop_by_hop};
use crate::resilience::{calculate_backoff, is_retryable, RetryBudget};

/// Forwards matched requests to backend groups.
#[derive(Debug)]
pub struct ProxyDispatcher {
    client: Client<HttpConnector, Body>,
    default_timeout: Duration,
    retries: RetryConfig,
    budget: RetryBudget,
}

/// Outbound body for one or more attempts.
enum OutboundBody {
    /// Buffered, can be replayed.
    Replayable(Bytes),
    /// Streamed, usable once.
    Once(Option<Body>),
}

impl OutboundBody {
    fn next(&mut self) -> Body {
        match self {
            OutboundBody::Replayable(bytes) => Body::from(bytes.clone()),
            OutboundBody::Once(body) => body.take().unwrap_or_else(Body::empty),
        }
    }

    fn replayable(&self) -> bool {
        matches!(self, OutboundBody::Replayable(_))
    }
}

impl ProxyDispatcher {
    pub fn new(timeouts: &TimeoutConfig, retries: &RetryConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(timeouts.idle_secs))
            .build(connector);

        Self {
            client,
            default_timeout: Duration::from_secs(timeouts.request_secs),
            retries: retries.clone(),
            budget: RetryBudget::new(retries.budget_ratio),
        }
    }

    /// Process one matched request end to end.
    ///
    /// Short-circuit responses are returned as `Ok`. On `Err` the caller owns
    /// turning the error into a response (and running the response phase).
    pub async fn dispatch(
        &self,
        ctx: &mut RequestContext,
        pipeline: &CompiledPipeline,
        group: &BackendGroup,
    ) -> Result<Response, GatewayError> {
        if let Err(response) = pipeline.run_request(ctx) {
            return Ok(response);
        }

        let timeout = ctx
            .route
            .as_ref()
            .and_then(|r| r.timeout)
            .unwrap_or(self.default_timeout);

        let mut body = self.outbound_body(ctx).await?;
        let max_attempts = if body.replayable() {
            self.retries.max_attempts.max(1)
        } else {
            1
        };
        self.budget.record_request();

        let mut attempt = 0;
        loop {
            attempt += 1;

            let Some(target) = group.select() else {
                tracing::warn!(request_id = %ctx.request_id, group = %group.name, "No live targets");
                return Err(GatewayError::ServiceUnavailable(group.name.clone()));
            };
            let guard = target.acquire();

            let request = build_upstream_request(ctx, &target.url, body.next())?;
            tracing::debug!(
                request_id = %ctx.request_id,
                route = %ctx.route_id(),
                target = %target.url,
                attempt,
                "Forwarding request"
            );

            match tokio::time::timeout(timeout, self.client.request(request)).await {
                Err(_) => {
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        target = %target.url,
                        timeout_ms = timeout.as_millis() as u64,
                        "Upstream timed out"
                    );
                    count_failure(&group.name, group.failure_threshold(), &target, "timeout");
                    return Err(GatewayError::Timeout {
                        target: target.url.to_string(),
                        timeout,
                    });
                }
                Ok(Err(e)) => {
                    tracing::error!(request_id = %ctx.request_id, target = %target.url, attempt, error = %e, "Upstream error");
                    count_failure(&group.name, group.failure_threshold(), &target, "connection");

                    // Only retry when the request never reached the upstream.
                    if e.is_connect() && attempt < max_attempts && self.budget.try_acquire() {
                        let backoff = calculate_backoff(
                            attempt,
                            self.retries.base_delay_ms,
                            self.retries.max_delay_ms,
                        );
                        tracing::info!(request_id = %ctx.request_id, attempt, delay = ?backoff, "Retrying after connection error");
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(GatewayError::ConnectionRefused {
                        target: target.url.to_string(),
                        reason: e.to_string(),
                    });
                }
                Ok(Ok(upstream)) => {
                    if target.record_success() {
                        tracing::info!(group = %group.name, target = %target.url, "Target revived");
                        metrics::record_backend_health(&group.name, target.url.as_str(), true);
                    }

                    let watch = BodyWatch {
                        guard,
                        group: group.name.clone(),
                        threshold: group.failure_threshold(),
                        idle: timeout,
                    };
                    let mut response = into_downstream(upstream, watch);
                    pipeline.run_response(ctx, &mut response);
                    return Ok(response);
                }
            }
        }
    }

    /// Buffer the body when the request may be retried and it is small
    /// enough; stream it otherwise.
    async fn outbound_body(&self, ctx: &mut RequestContext) -> Result<OutboundBody, GatewayError> {
        let body = ctx.take_body();
        if self.retries.max_attempts <= 1 || !is_retryable(&ctx.method) {
            return Ok(OutboundBody::Once(Some(body)));
        }

        let limit = self.retries.max_buffered_body;
        let declared = ctx
            .header(header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse::<usize>().ok());
        let chunked = ctx.headers.contains_key(header::TRANSFER_ENCODING);
        let fits = match declared {
            Some(len) => len <= limit,
            None => !chunked,
        };
        if !fits {
            return Ok(OutboundBody::Once(Some(body)));
        }

        axum::body::to_bytes(body, limit)
            .await
            .map(OutboundBody::Replayable)
            .map_err(|e| GatewayError::Internal(format!("failed to read request body: {e}")))
    }
}

fn count_failure(group: &str, threshold: u32, target: &Target, kind: &'static str) {
    metrics::record_upstream_failure(group, kind);
    if target.record_failure(threshold) {
        tracing::warn!(
            group = %group,
            target = %target.url,
            failures = target.consecutive_failures(),
            "Target marked dead"
        );
        metrics::record_backend_health(group, target.url.as_str(), false);
    }
}

/// What a streamed response body needs to outlive the dispatch call.
struct BodyWatch {
    guard: TargetGuard,
    group: String,
    threshold: u32,
    /// Longest wait for the next body frame.
    idle: Duration,
}

/// Wrap an upstream body so that a stall longer than `watch.idle` ends the
/// stream with an error and counts against the target. The target's
/// in-flight slot is released once the stream finishes or is dropped.
fn guarded_body(body: Body, watch: BodyWatch) -> Body {
    let frames = body.into_data_stream();
    let guarded = stream::unfold(Some((frames, watch)), |state| async move {
        let (mut frames, watch) = state?;
        match tokio::time::timeout(watch.idle, frames.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok::<Bytes, BoxError>(chunk), Some((frames, watch)))),
            Ok(Some(Err(e))) => Some((Err(e.into()), None)),
            Ok(None) => None,
            Err(_) => {
                let target = watch.guard.target();
                tracing::warn!(
                    group = %watch.group,
                    target = %target.url,
                    timeout_ms = watch.idle.as_millis() as u64,
                    "Upstream body stalled"
                );
                count_failure(&watch.group, watch.threshold, target, "body_timeout");
                let err = io::Error::new(io::ErrorKind::TimedOut, "upstream body stalled");
                Some((Err(err.into()), None))
            }
        }
    });
    Body::from_stream(guarded)
}

/// Join the target base URL (including any path prefix) with the request
/// path and query.
pub fn upstream_uri(base: &Url, uri: &Uri) -> Result<Uri, GatewayError> {
    let prefix = base.path().trim_end_matches('/');
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let joined = format!("{}{}{}", base.origin().ascii_serialization(), prefix, path_and_query);
    joined
        .parse::<Uri>()
        .map_err(|e| GatewayError::Internal(format!("invalid upstream uri '{joined}': {e}")))
}

/// Stream the upstream response back, minus connection-scoped headers.
fn into_downstream(upstream: hyper::Response<Incoming>, watch: BodyWatch) -> Response {
    let (mut parts, incoming) = upstream.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, guarded_body(Body::new(incoming), watch))
}

fn build_upstream_request(
    ctx: &RequestContext,
    target: &Url,
    body: Body,
) -> Result<Request<Body>, GatewayError> {
    let mut headers = ctx.headers.clone();
    strip_hop_by_hop(&mut headers);
    add_forwarded(&mut headers, ctx.client_addr);
    // The client sets Host from the upstream URI.
    headers.remove(header::HOST);

    let mut request = Request::builder()
        .method(ctx.method.clone())
        .uri(upstream_uri(target, &ctx.uri)?)
        .body(body)
        .map_err(|e| GatewayError::Internal(format!("failed to build upstream request: {e}")))?;
    *request.headers_mut() = headers;
    Ok(request)
}
