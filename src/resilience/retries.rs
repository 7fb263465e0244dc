//! Retry logic.
//!
//! # Responsibilities
//! - Determine if a request is retryable (idempotent methods only)
//! - Enforce a retry budget (retries as a fraction of requests per window)
//!
//! # Design Decisions
//! - Never retry POST/PATCH (non-idempotent)
//! - Only connection failures are retried; timeouts and 5xx are not
//! - The budget always allows a small floor so a quiet gateway can retry

use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::Method;

const WINDOW: Duration = Duration::from_secs(10);
const MIN_RETRIES_PER_WINDOW: u64 = 3;

/// Methods whose replay has no additional side effect.
pub fn is_retryable(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE | Method::PUT | Method::DELETE
    )
}

#[derive(Debug)]
struct Window {
    started: Instant,
    requests: u64,
    retries: u64,
}

/// Bounds retries to `ratio` of the requests seen in the current window.
#[derive(Debug)]
pub struct RetryBudget {
    ratio: f64,
    window: Mutex<Window>,
}

impl RetryBudget {
    pub fn new(ratio: f64) -> Self {
        Self {
            ratio: ratio.max(0.0),
            window: Mutex::new(Window {
                started: Instant::now(),
                requests: 0,
                retries: 0,
            }),
        }
    }

    fn with_window<R>(&self, f: impl FnOnce(&mut Window) -> R) -> R {
        let mut guard = match self.window.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.started.elapsed() >= WINDOW {
            *guard = Window {
                started: Instant::now(),
                requests: 0,
                retries: 0,
            };
        }
        f(&mut guard)
    }

    /// Count one first attempt.
    pub fn record_request(&self) {
        self.with_window(|w| w.requests += 1);
    }

    /// Spend one retry if the budget allows it.
    pub fn try_acquire(&self) -> bool {
        let ratio = self.ratio;
        self.with_window(|w| {
            let allowed = MIN_RETRIES_PER_WINDOW + (w.requests as f64 * ratio) as u64;
            if w.retries < allowed {
                w.retries += 1;
                true
            } else {
                false
            }
        })
    }
}
