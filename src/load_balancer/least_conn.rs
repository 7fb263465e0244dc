//! Least Connections load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{backend::Target, LoadBalancer};

/// Least connections selector.
/// Selects the live target with the fewest in-flight requests.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn next_target(&self, targets: &[Arc<Target>]) -> Option<Arc<Target>> {
        // In case of tie, the first one is selected (stability)
        targets
            .iter()
            .filter(|t| t.is_alive())
            .min_by_key(|t| t.in_flight())
            .cloned()
    }
}
