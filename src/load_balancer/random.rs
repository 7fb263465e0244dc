//! Uniform random load balancing strategy.

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::load_balancer::{backend::Target, LoadBalancer};

#[derive(Debug, Default)]
pub struct RandomChoice;

impl RandomChoice {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for RandomChoice {
    fn next_target(&self, targets: &[Arc<Target>]) -> Option<Arc<Target>> {
        let live: Vec<&Arc<Target>> = targets.iter().filter(|t| t.is_alive()).collect();
        live.choose(&mut rand::thread_rng()).map(|t| Arc::clone(t))
    }
}
