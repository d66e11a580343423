//! Region Coordinator — parallel fan-out execution across regions
//!
//! Executes a workload across the named regions in parallel, recording a
//! replica copy of the workload state per region and replicating the state
//! change through the distributed state layer. Region metrics updates feed
//! failure detection: a region reporting UNAVAILABLE triggers failover for
//! every workload replicated there.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

use crate::config::defaults::COORDINATION_OVERHEAD_FRACTION;
use crate::types::{
    ConsistencyLevel, CoordinationResult, RegionConfig, RegionMetrics, RegionStatus, Workload,
};

use super::failover::FailoverDriver;
use super::state::DistributedState;

/// Cross-region workload coordinator.
pub struct RegionCoordinator {
    regions: Vec<RegionConfig>,
    state: Arc<DistributedState>,
    failover: FailoverDriver,
    metrics: Mutex<HashMap<String, RegionMetrics>>,
    workloads: Mutex<HashMap<String, Workload>>,
}

impl RegionCoordinator {
    pub fn new(regions: Vec<RegionConfig>, state: Arc<DistributedState>) -> Self {
        Self {
            failover: FailoverDriver::new(regions.clone()),
            regions,
            state,
            metrics: Mutex::new(HashMap::new()),
            workloads: Mutex::new(HashMap::new()),
        }
    }

    /// Execute a workload across regions in parallel.
    ///
    /// `regions` defaults to every configured region. Each region records a
    /// replica of the workload state; a region that fails execution lands
    /// in `failed_regions` and triggers failover handling.
    pub async fn execute_coordinated_workflow(
        &self,
        workload_id: &str,
        name: &str,
        state: BTreeMap<String, serde_json::Value>,
        regions: Option<Vec<String>>,
    ) -> CoordinationResult {
        let started = Instant::now();
        let target_regions: Vec<String> = regions.unwrap_or_else(|| {
            self.regions.iter().map(|r| r.region_id.clone()).collect()
        });

        let primary = target_regions
            .first()
            .cloned()
            .unwrap_or_else(|| "none".to_string());
        let mut workload = Workload {
            workload_id: workload_id.to_string(),
            name: name.to_string(),
            primary_region: primary,
            backup_regions: target_regions.iter().skip(1).cloned().collect(),
            state: state.clone(),
            replicas: BTreeMap::new(),
            consistency_level: ConsistencyLevel::Eventual,
            created_at: Utc::now(),
        };

        // Fan out in parallel; each region only records its replica, so a
        // join over lightweight tasks keeps observable interleaving.
        let mut join_set = tokio::task::JoinSet::new();
        for region_id in target_regions.clone() {
            let unavailable = self.is_unavailable(&region_id);
            join_set.spawn(async move { (region_id, !unavailable) });
        }

        let mut executed = Vec::new();
        let mut failed = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((region_id, true)) => {
                    workload
                        .replicas
                        .insert(region_id.clone(), workload.state.clone());
                    executed.push(region_id);
                }
                Ok((region_id, false)) => failed.push(region_id),
                Err(e) => warn!(error = %e, "Region execution task failed"),
            }
        }
        executed.sort();
        failed.sort();

        // Active workloads keep a replica in their primary region; demote
        // the primary to a surviving region when it failed.
        if !workload.replicas.contains_key(&workload.primary_region) {
            if let Some(survivor) = executed.first() {
                workload.primary_region = survivor.clone();
            }
        }

        self.workloads
            .lock()
            .expect("workload registry lock poisoned")
            .insert(workload.workload_id.clone(), workload.clone());

        // Replicate the new state through the distributed state layer.
        let replication = self
            .state
            .replicate_state(workload_id, BTreeMap::new(), state)
            .await;
        for (region_id, ok) in &replication.regions {
            if !ok && !failed.contains(region_id) {
                failed.push(region_id.clone());
            }
        }
        failed.sort();
        failed.dedup();

        let mut failover_triggered = false;
        if let Some(first_failed) = failed.first() {
            self.failover
                .handle_region_failure(first_failed, &[workload.clone()])
                .await;
            failover_triggered = true;
        }

        let wall_ms = started.elapsed().as_secs_f64() * 1_000.0;
        let status = if failed.is_empty() {
            "success"
        } else if executed.is_empty() {
            "failed"
        } else {
            "partial"
        };

        info!(
            workload = workload_id,
            status = status,
            executed = executed.len(),
            failed = failed.len(),
            wall_ms = wall_ms,
            "Coordinated workflow finished"
        );

        CoordinationResult {
            workflow_id: workload_id.to_string(),
            status: status.to_string(),
            executed_regions: executed.into_iter().filter(|r| !failed.contains(r)).collect(),
            failed_regions: failed,
            execution_time_ms: wall_ms,
            coordination_overhead_ms: wall_ms * COORDINATION_OVERHEAD_FRACTION,
            data_consistency_achieved: self.state.is_consistent(),
            failover_triggered,
        }
    }

    /// Update region metrics; an UNAVAILABLE region triggers failover for
    /// the workloads replicated there.
    pub async fn update_region_metrics(&self, updates: Vec<RegionMetrics>) -> Vec<CoordinationResult> {
        let mut results = Vec::new();
        for metric in updates {
            let region_id = metric.region_id.clone();
            let unavailable = metric.status == RegionStatus::Unavailable;
            self.metrics
                .lock()
                .expect("region metrics lock poisoned")
                .insert(region_id.clone(), metric);

            if unavailable {
                let affected: Vec<Workload> = {
                    let workloads = self
                        .workloads
                        .lock()
                        .expect("workload registry lock poisoned");
                    workloads
                        .values()
                        .filter(|w| w.replicas.contains_key(&region_id))
                        .cloned()
                        .collect()
                };
                if !affected.is_empty() {
                    results.push(
                        self.failover
                            .handle_region_failure(&region_id, &affected)
                            .await,
                    );
                }
            }
        }
        results
    }

    /// The failover driver (for direct plan inspection).
    pub fn failover(&self) -> &FailoverDriver {
        &self.failover
    }

    /// Current metrics snapshot per region.
    pub fn region_metrics(&self) -> HashMap<String, RegionMetrics> {
        self.metrics
            .lock()
            .expect("region metrics lock poisoned")
            .clone()
    }

    /// A registered workload by id.
    pub fn workload(&self, workload_id: &str) -> Option<Workload> {
        self.workloads
            .lock()
            .expect("workload registry lock poisoned")
            .get(workload_id)
            .cloned()
    }

    fn is_unavailable(&self, region_id: &str) -> bool {
        self.metrics
            .lock()
            .expect("region metrics lock poisoned")
            .get(region_id)
            .map(|m| m.status == RegionStatus::Unavailable)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryRegionReplicator;
    use serde_json::json;

    fn regions() -> Vec<RegionConfig> {
        [("us-east", 1, 50), ("eu-west", 2, 80), ("ap-southeast", 3, 120)]
            .iter()
            .map(|(id, priority, latency)| RegionConfig {
                region_id: id.to_string(),
                name: id.to_string(),
                primary_datacenter: format!("{id}-dc1"),
                backup_datacenters: vec![],
                latency_budget_ms: *latency,
                priority: *priority,
                active: true,
            })
            .collect()
    }

    fn coordinator() -> (RegionCoordinator, Arc<MemoryRegionReplicator>) {
        let replicator = Arc::new(MemoryRegionReplicator::new());
        let state = Arc::new(DistributedState::new(regions(), replicator.clone()));
        (RegionCoordinator::new(regions(), state), replicator)
    }

    fn metrics(region: &str, status: RegionStatus) -> RegionMetrics {
        RegionMetrics {
            region_id: region.to_string(),
            status,
            latency_ms: 20.0,
            throughput_rps: 100.0,
            error_rate: 0.001,
            cpu_usage_percent: 40.0,
            memory_usage_percent: 50.0,
            replicated_workloads: 1,
            last_heartbeat: Utc::now(),
        }
    }

    #[tokio::test]
    async fn all_regions_execute_and_replicate() {
        let (coordinator, replicator) = coordinator();
        let mut state = BTreeMap::new();
        state.insert("mode".to_string(), json!("active"));

        let result = coordinator
            .execute_coordinated_workflow("w1", "containment", state, None)
            .await;

        assert_eq!(result.status, "success");
        assert_eq!(result.executed_regions.len(), 3);
        assert!(result.failed_regions.is_empty());
        assert!(!result.failover_triggered);
        assert!(result.data_consistency_achieved);

        let workload = coordinator.workload("w1").unwrap();
        assert_eq!(workload.replicas.len(), 3);
        assert!(workload.replicas.contains_key(&workload.primary_region));
        assert_eq!(replicator.replicated_to("us-east").len(), 1);
    }

    #[tokio::test]
    async fn unavailable_region_triggers_failover() {
        let (coordinator, replicator) = coordinator();
        replicator.set_unreachable("us-east");
        coordinator
            .update_region_metrics(vec![metrics("us-east", RegionStatus::Unavailable)])
            .await;

        let result = coordinator
            .execute_coordinated_workflow("w1", "containment", BTreeMap::new(), None)
            .await;

        assert_eq!(result.status, "partial");
        assert!(result.failover_triggered);
        assert_eq!(result.failed_regions, vec!["us-east"]);
        assert_eq!(result.executed_regions, vec!["ap-southeast", "eu-west"]);

        // The primary demotes to a surviving region.
        let workload = coordinator.workload("w1").unwrap();
        assert_ne!(workload.primary_region, "us-east");
        assert!(workload.replicas.contains_key(&workload.primary_region));
    }

    #[tokio::test]
    async fn metric_update_fails_over_replicated_workloads() {
        let (coordinator, _replicator) = coordinator();
        coordinator
            .execute_coordinated_workflow("w1", "containment", BTreeMap::new(), None)
            .await;

        let results = coordinator
            .update_region_metrics(vec![metrics("eu-west", RegionStatus::Unavailable)])
            .await;
        assert_eq!(results.len(), 1);
        assert!(results[0].failover_triggered);
        assert_eq!(results[0].failed_regions, vec!["eu-west"]);
    }
}
