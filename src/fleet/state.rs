//! Distributed state — logical clocks, bounded change log, LWW conflicts
//!
//! Each region owns a monotonically increasing logical clock; every state
//! change carries the clock value current at its origin. Changes append to
//! a bounded in-memory log and replicate through the pluggable region
//! replicator under a timeout. Conflicts are pairs of changes to the same
//! workload from different regions whose new-state key sets intersect;
//! resolution is last-writer-wins by timestamp, ties broken by region id.

use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::identity;
use crate::storage::RegionReplicator;
use crate::types::{RegionConfig, StateChange};

/// Replication outcome per region for one state change.
#[derive(Debug, Clone, Serialize)]
pub struct ReplicationStatus {
    pub change_id: String,
    /// region_id -> replication succeeded
    pub regions: BTreeMap<String, bool>,
}

/// Region-replicated state manager.
pub struct DistributedState {
    regions: Vec<RegionConfig>,
    replicator: Arc<dyn RegionReplicator>,
    replication_timeout: Duration,
    log_cap: usize,
    inner: Mutex<StateInner>,
}

#[derive(Default)]
struct StateInner {
    clocks: HashMap<String, i64>,
    log: VecDeque<StateChange>,
    resolved_conflicts: u64,
    unresolved_conflicts: u64,
}

impl DistributedState {
    pub fn new(regions: Vec<RegionConfig>, replicator: Arc<dyn RegionReplicator>) -> Self {
        let cfg = &crate::config::get().fleet;
        let mut inner = StateInner::default();
        for region in &regions {
            inner.clocks.insert(region.region_id.clone(), 0);
        }
        Self {
            regions,
            replicator,
            replication_timeout: Duration::from_millis(cfg.replication_timeout_ms),
            log_cap: cfg.state_log_cap,
            inner: Mutex::new(inner),
        }
    }

    /// Replicate a workload state change to every active region.
    ///
    /// Per region: the logical clock increments, a change record is
    /// appended to the log, and the replicator is invoked under the
    /// replication timeout. The log snapshot happens before any await.
    pub async fn replicate_state(
        &self,
        workload_id: &str,
        old_state: BTreeMap<String, serde_json::Value>,
        new_state: BTreeMap<String, serde_json::Value>,
    ) -> ReplicationStatus {
        let change_id = identity::execution_id();
        let mut pending: Vec<(String, StateChange)> = Vec::new();

        {
            let mut inner = self.inner.lock().expect("state log lock poisoned");
            for region in self.regions.iter().filter(|r| r.active) {
                let clock = inner
                    .clocks
                    .entry(region.region_id.clone())
                    .or_insert(0);
                *clock += 1;
                let change = StateChange {
                    change_id: change_id.clone(),
                    timestamp: Utc::now(),
                    region_id: region.region_id.clone(),
                    workload_id: workload_id.to_string(),
                    old_state: old_state.clone(),
                    new_state: new_state.clone(),
                    version: *clock,
                };
                inner.log.push_back(change.clone());
                while inner.log.len() > self.log_cap {
                    inner.log.pop_front();
                }
                pending.push((region.region_id.clone(), change));
            }
        }

        let mut regions = BTreeMap::new();
        for (region_id, change) in pending {
            let ok = match tokio::time::timeout(
                self.replication_timeout,
                self.replicator.replicate(&region_id, &change),
            )
            .await
            {
                Ok(Ok(ack)) => {
                    debug!(
                        region = %region_id,
                        version = change.version,
                        latency_ms = ack.latency_ms,
                        "State change replicated"
                    );
                    ack.ok
                }
                Ok(Err(e)) => {
                    warn!(region = %region_id, error = %e, "Replication failed");
                    false
                }
                Err(_) => {
                    warn!(
                        region = %region_id,
                        timeout_ms = self.replication_timeout.as_millis() as u64,
                        "Replication timed out"
                    );
                    false
                }
            };
            regions.insert(region_id, ok);
        }

        ReplicationStatus { change_id, regions }
    }

    /// Detect conflicting pairs among a set of changes.
    pub fn detect_conflicts(changes: &[StateChange]) -> Vec<(StateChange, StateChange)> {
        let mut conflicts = Vec::new();
        for (i, a) in changes.iter().enumerate() {
            for b in changes.iter().skip(i + 1) {
                if a.conflicts_with(b) {
                    conflicts.push((a.clone(), b.clone()));
                }
            }
        }
        conflicts
    }

    /// Resolve conflicts last-writer-wins by timestamp; logical-clock ties
    /// break by region id. Exactly one change per conflicting pair
    /// survives, and its timestamp is never earlier than the loser's.
    pub fn resolve_conflicts(
        &self,
        conflicts: &[(StateChange, StateChange)],
    ) -> BTreeMap<String, StateChange> {
        let mut resolved = BTreeMap::new();
        let mut inner = self.inner.lock().expect("state log lock poisoned");
        for (a, b) in conflicts {
            let winner = match a.timestamp.cmp(&b.timestamp) {
                std::cmp::Ordering::Greater => a,
                std::cmp::Ordering::Less => b,
                std::cmp::Ordering::Equal => {
                    if a.region_id >= b.region_id {
                        a
                    } else {
                        b
                    }
                }
            };
            resolved.insert(winner.workload_id.clone(), winner.clone());
            inner.resolved_conflicts += 1;
        }
        resolved
    }

    /// Mark conflicts that could not be resolved (consistency reporting).
    pub fn record_unresolved(&self, count: u64) {
        self.inner
            .lock()
            .expect("state log lock poisoned")
            .unresolved_conflicts += count;
    }

    /// True when no conflicts remain unresolved.
    pub fn is_consistent(&self) -> bool {
        self.inner
            .lock()
            .expect("state log lock poisoned")
            .unresolved_conflicts
            == 0
    }

    /// Current logical clock per region.
    pub fn region_clocks(&self) -> HashMap<String, i64> {
        self.inner
            .lock()
            .expect("state log lock poisoned")
            .clocks
            .clone()
    }

    /// Snapshot of the most recent changes, newest last.
    pub fn recent_changes(&self, limit: usize) -> Vec<StateChange> {
        let inner = self.inner.lock().expect("state log lock poisoned");
        inner
            .log
            .iter()
            .rev()
            .take(limit)
            .rev()
            .cloned()
            .collect()
    }

    pub fn log_len(&self) -> usize {
        self.inner.lock().expect("state log lock poisoned").log.len()
    }

    /// Configured regions.
    pub fn regions(&self) -> &[RegionConfig] {
        &self.regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryRegionReplicator;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    fn regions() -> Vec<RegionConfig> {
        ["us-east", "eu-west", "ap-southeast"]
            .iter()
            .enumerate()
            .map(|(i, id)| RegionConfig {
                region_id: id.to_string(),
                name: id.to_string(),
                primary_datacenter: format!("{id}-dc1"),
                backup_datacenters: vec![format!("{id}-dc2")],
                latency_budget_ms: 100 + i as u64 * 50,
                priority: i as i32 + 1,
                active: true,
            })
            .collect()
    }

    fn change(region: &str, workload: &str, keys: &[&str], offset_secs: i64) -> StateChange {
        StateChange {
            change_id: format!("chg-{region}-{offset_secs}"),
            timestamp: Utc::now() + ChronoDuration::seconds(offset_secs),
            region_id: region.to_string(),
            workload_id: workload.to_string(),
            old_state: BTreeMap::new(),
            new_state: keys.iter().map(|k| (k.to_string(), json!(1))).collect(),
            version: 1,
        }
    }

    #[tokio::test]
    async fn replication_increments_every_region_clock() {
        let replicator = Arc::new(MemoryRegionReplicator::new());
        let state = DistributedState::new(regions(), replicator.clone());

        let mut new_state = BTreeMap::new();
        new_state.insert("mode".to_string(), json!("contained"));
        let status = state
            .replicate_state("w1", BTreeMap::new(), new_state)
            .await;

        assert_eq!(status.regions.len(), 3);
        assert!(status.regions.values().all(|&ok| ok));
        let clocks = state.region_clocks();
        assert!(clocks.values().all(|&v| v == 1));
        assert_eq!(state.log_len(), 3);
        assert_eq!(replicator.replicated_to("eu-west").len(), 1);
    }

    #[tokio::test]
    async fn failed_region_reports_false_without_blocking_others() {
        let replicator = Arc::new(MemoryRegionReplicator::new());
        replicator.set_unreachable("us-east");
        let state = DistributedState::new(regions(), replicator);

        let status = state
            .replicate_state("w1", BTreeMap::new(), BTreeMap::new())
            .await;
        assert_eq!(status.regions["us-east"], false);
        assert_eq!(status.regions["eu-west"], true);
    }

    #[test]
    fn lww_resolution_keeps_the_newer_change() {
        let replicator = Arc::new(MemoryRegionReplicator::new());
        let state = DistributedState::new(regions(), replicator);

        let older = change("us-east", "w1", &["mode"], 0);
        let newer = change("eu-west", "w1", &["mode"], 10);
        let conflicts = DistributedState::detect_conflicts(&[older.clone(), newer.clone()]);
        assert_eq!(conflicts.len(), 1);

        let resolved = state.resolve_conflicts(&conflicts);
        let winner = &resolved["w1"];
        assert_eq!(winner.region_id, "eu-west");
        assert!(winner.timestamp >= older.timestamp);
        assert!(state.is_consistent());
    }

    #[test]
    fn non_overlapping_changes_do_not_conflict() {
        let a = change("us-east", "w1", &["mode"], 0);
        let b = change("eu-west", "w1", &["owner"], 1);
        assert!(DistributedState::detect_conflicts(&[a, b]).is_empty());
    }

    #[test]
    fn timestamp_tie_breaks_by_region_id() {
        let replicator = Arc::new(MemoryRegionReplicator::new());
        let state = DistributedState::new(regions(), replicator);

        let ts = Utc::now();
        let mut a = change("us-east", "w1", &["mode"], 0);
        let mut b = change("eu-west", "w1", &["mode"], 0);
        a.timestamp = ts;
        b.timestamp = ts;

        let resolved = state.resolve_conflicts(&[(a, b)]);
        // "us-east" > "eu-west" lexicographically, so it wins the tie.
        assert_eq!(resolved["w1"].region_id, "us-east");
    }
}
