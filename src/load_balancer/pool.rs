//! Backend group management.
//!
//! # Responsibilities
//! - Own the targets of each named backend group
//! - Apply the group's load balancing algorithm to select a target
//! - Give dead targets a trial request once their cooldown has passed, so
//!   they can recover without active probing
//! - Expose target state to health checking and the admin API

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::{BackendGroupSpec, Strategy};
use crate::load_balancer::{backend::Target, balancer_for, LoadBalancer};

/// A named set of targets with a selection strategy.
#[derive(Debug)]
pub struct BackendGroup {
    pub name: String,
    pub strategy: Strategy,
    targets: Vec<Arc<Target>>,
    balancer: Box<dyn LoadBalancer>,
    failure_threshold: u32,
    dead_cooldown: Duration,
}

impl BackendGroup {
    pub fn new(spec: &BackendGroupSpec, failure_threshold: u32, dead_cooldown: Duration) -> Self {
        Self {
            name: spec.name.clone(),
            strategy: spec.strategy,
            targets: spec
                .targets
                .iter()
                .cloned()
                .map(|url| Arc::new(Target::new(url)))
                .collect(),
            balancer: balancer_for(spec.strategy),
            failure_threshold,
            dead_cooldown,
        }
    }

    /// Pick a target: a dead one whose cooldown is over gets one trial
    /// request, otherwise the strategy picks among live targets. `None` when
    /// every target is dead and cooling down.
    pub fn select(&self) -> Option<Arc<Target>> {
        if let Some(trial) = self.targets.iter().find(|t| t.claim_trial(self.dead_cooldown)) {
            tracing::debug!(group = %self.name, target = %trial.url, "Trying dead target after cooldown");
            return Some(trial.clone());
        }
        let picked = self.balancer.next_target(&self.targets);
        if picked.is_none() {
            tracing::debug!(group = %self.name, targets = self.targets.len(), "No live targets in group");
        }
        picked
    }

    pub fn targets(&self) -> &[Arc<Target>] {
        &self.targets
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn live_count(&self) -> usize {
        self.targets.iter().filter(|t| t.is_alive()).count()
    }
}

/// Point-in-time view of one target, for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct TargetSnapshot {
    pub group: String,
    pub url: String,
    pub alive: bool,
    pub in_flight: usize,
    pub consecutive_failures: u32,
}

/// All backend groups of one generation, by name.
#[derive(Debug, Default)]
pub struct BackendGroups {
    groups: HashMap<String, Arc<BackendGroup>>,
}

impl BackendGroups {
    pub fn new(specs: &[BackendGroupSpec], failure_threshold: u32, dead_cooldown: Duration) -> Self {
        let groups = specs
            .iter()
            .map(|spec| {
                (
                    spec.name.clone(),
                    Arc::new(BackendGroup::new(spec, failure_threshold, dead_cooldown)),
                )
            })
            .collect();
        Self { groups }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<BackendGroup>> {
        self.groups.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BackendGroup>> {
        self.groups.values()
    }

    /// Every target of every group (for health checking).
    pub fn all_targets(&self) -> Vec<(Arc<BackendGroup>, Arc<Target>)> {
        self.groups
            .values()
            .flat_map(|g| g.targets.iter().map(move |t| (g.clone(), t.clone())))
            .collect()
    }

    /// Sorted by group then URL so the output is stable.
    pub fn snapshot(&self) -> Vec<TargetSnapshot> {
        let mut out: Vec<TargetSnapshot> = self
            .groups
            .values()
            .flat_map(|g| {
                g.targets.iter().map(move |t| TargetSnapshot {
                    group: g.name.clone(),
                    url: t.url.to_string(),
                    alive: t.is_alive(),
                    in_flight: t.in_flight(),
                    consecutive_failures: t.consecutive_failures(),
                })
            })
            .collect();
        out.sort_by(|a, b| (&a.group, &a.url).cmp(&(&b.group, &b.url)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn spec(name: &str, ports: &[u16], strategy: Strategy) -> BackendGroupSpec {
        BackendGroupSpec {
            name: name.into(),
            targets: ports
                .iter()
                .map(|p| Url::parse(&format!("http://127.0.0.1:{p}")).unwrap())
                .collect(),
            strategy,
        }
    }

    #[test]
    fn test_groups_and_snapshot() {
        let groups = BackendGroups::new(
            &[
                spec("users", &[3001, 3002], Strategy::RoundRobin),
                spec("orders", &[3003], Strategy::LeastConnections),
            ],
            3,
            Duration::from_secs(10),
        );
        assert_eq!(groups.all_targets().len(), 3);
        let users = groups.get("users").unwrap();
        assert_eq!(users.failure_threshold(), 3);
        assert!(groups.get("missing").is_none());

        let snap = groups.snapshot();
        assert_eq!(snap[0].group, "orders");
        assert_eq!(snap[1].url, "http://127.0.0.1:3001/");
        assert!(snap.iter().all(|t| t.alive));
    }

    #[test]
    fn test_select_none_when_all_dead() {
        let group = BackendGroup::new(
            &spec("web", &[3000, 3001], Strategy::Random),
            1,
            Duration::from_secs(60),
        );
        for t in group.targets() {
            t.record_failure(group.failure_threshold());
        }
        assert_eq!(group.live_count(), 0);
        assert!(group.select().is_none());
    }

    #[test]
    fn test_dead_target_gets_one_trial_after_cooldown() {
        let group = BackendGroup::new(
            &spec("web", &[3000, 3001], Strategy::RoundRobin),
            1,
            Duration::from_millis(30),
        );
        group.targets()[0].record_failure(1);

        // Cooling down: only the live target is offered.
        for _ in 0..3 {
            assert_eq!(group.select().unwrap().url.port(), Some(3001));
        }

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(group.select().unwrap().url.port(), Some(3000));
        // The trial is handed out once per cooldown.
        assert_eq!(group.select().unwrap().url.port(), Some(3001));
        assert!(!group.targets()[0].is_alive());
    }
}
