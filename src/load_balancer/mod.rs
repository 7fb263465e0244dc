//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → backend_group identified
//!     → pool.rs (group's targets + strategy)
//!     → Apply load balancing algorithm over live targets:
//!         - round_robin.rs (rotate through targets)
//!         - least_conn.rs (pick target with fewest in-flight requests)
//!         - random.rs (uniform pick)
//!     → backend.rs (in-flight guard, liveness bookkeeping)
//!     → Return target or None (all dead)
//! ```
//!
//! # Design Decisions
//! - Balancers only see live targets and never block
//! - Algorithm selection per backend group
//! - Liveness lives on the target (atomics), shared by the dispatcher and
//!   the health monitor within one generation

pub mod backend;
pub mod least_conn;
pub mod pool;
pub mod random;
pub mod round_robin;

use std::fmt::Debug;
use std::sync::Arc;

use crate::config::Strategy;

pub use backend::{Target, TargetGuard};
pub use pool::{BackendGroup, BackendGroups, TargetSnapshot};

/// Target selection strategy.
pub trait LoadBalancer: Send + Sync + Debug {
    /// Pick one live target, or `None` when every target is dead.
    fn next_target(&self, targets: &[Arc<Target>]) -> Option<Arc<Target>>;
}

/// Instantiate the balancer for a configured strategy.
pub fn balancer_for(strategy: Strategy) -> Box<dyn LoadBalancer> {
    match strategy {
        Strategy::RoundRobin => Box::new(round_robin::RoundRobin::new()),
        Strategy::LeastConnections => Box::new(least_conn::LeastConnections::new()),
        Strategy::Random => Box::new(random::RandomChoice::new()),
    }
}
