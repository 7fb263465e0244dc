//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{backend::Target, LoadBalancer};

/// Round-robin selector.
/// Stores an internal counter to rotate through targets.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_target(&self, targets: &[Arc<Target>]) -> Option<Arc<Target>> {
        if targets.is_empty() {
            return None;
        }

        // Dead targets are skipped; a full lap without a live one means none.
        let start = self.counter.fetch_add(1, Ordering::Relaxed);
        let len = targets.len();
        (0..len)
            .map(|i| &targets[(start + i) % len])
            .find(|t| t.is_alive())
            .cloned()
    }
}
