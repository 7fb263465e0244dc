//! Backend target abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream base URL
//! - Track in-flight requests (for Least Connections LB)
//! - Track liveness: dead after N consecutive failures, alive on any success
//! - Hand a dead target out for one trial request once its cooldown elapses

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use url::Url;

/// A single upstream target.
#[derive(Debug)]
pub struct Target {
    pub url: Url,
    in_flight: AtomicUsize,
    alive: AtomicBool,
    consecutive_failures: AtomicU32,
    /// Set while dead: when the target died or was last tried.
    dead_since: Mutex<Option<Instant>>,
}

impl Target {
    /// New targets start alive.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            in_flight: AtomicUsize::new(0),
            alive: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            dead_since: Mutex::new(None),
        }
    }

    fn dead_since(&self) -> MutexGuard<'_, Option<Instant>> {
        match self.dead_since.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Count a request for the lifetime of the returned guard.
    pub fn acquire(self: &Arc<Self>) -> TargetGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        TargetGuard {
            target: self.clone(),
        }
    }

    /// Report a timeout or connection failure. Returns `true` when this call
    /// transitioned the target to dead.
    pub fn record_failure(&self, threshold: u32) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= threshold.max(1) {
            let mut since = self.dead_since();
            let died = self.alive.swap(false, Ordering::AcqRel);
            // A failed trial restarts the cooldown.
            *since = Some(Instant::now());
            return died;
        }
        false
    }

    /// Claim the single trial request a dead target gets once `cooldown`
    /// has passed since it died or was last tried. Returns `false` for live
    /// targets and while the cooldown runs.
    pub fn claim_trial(&self, cooldown: Duration) -> bool {
        if self.is_alive() {
            return false;
        }
        let mut since = self.dead_since();
        match *since {
            Some(at) if at.elapsed() >= cooldown => {
                *since = Some(Instant::now());
                true
            }
            _ => false,
        }
    }

    /// Report a successful exchange or probe. Returns `true` when this call
    /// revived a dead target.
    pub fn record_success(&self) -> bool {
        let mut since = self.dead_since();
        self.consecutive_failures.store(0, Ordering::Release);
        *since = None;
        !self.alive.swap(true, Ordering::AcqRel)
    }
}

/// RAII guard over the in-flight counter.
#[derive(Debug)]
pub struct TargetGuard {
    target: Arc<Target>,
}

impl TargetGuard {
    pub fn target(&self) -> &Arc<Target> {
        &self.target
    }
}

impl Deref for TargetGuard {
    type Target = Target;
    fn deref(&self) -> &Self::Target {
        &self.target
    }
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        self.target.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
pub(crate) fn target(url: &str) -> Arc<Target> {
    Arc::new(Target::new(Url::parse(url).unwrap()))
}
