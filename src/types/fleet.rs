//! Fleet coordination types: region configuration and health, replicated
//! workloads, state-change records with logical clocks, and the results of
//! coordinated execution and failover.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Region health status as reported by regional monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RegionStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unavailable,
}

/// Data consistency guarantee levels for replicated workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsistencyLevel {
    /// Highest availability
    Eventual,
    /// Ordered causality
    Causal,
    /// Session consistency
    Session,
    /// Sequential consistency
    Strong,
}

/// Static configuration for a geographic region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub region_id: String,
    pub name: String,
    pub primary_datacenter: String,
    pub backup_datacenters: Vec<String>,
    /// SLA latency target (ms)
    pub latency_budget_ms: u64,
    /// Lower value = more preferred during failover selection
    pub priority: i32,
    pub active: bool,
}

/// Live metrics for a region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionMetrics {
    pub region_id: String,
    pub status: RegionStatus,
    pub latency_ms: f64,
    pub throughput_rps: f64,
    pub error_rate: f64,
    pub cpu_usage_percent: f64,
    pub memory_usage_percent: f64,
    pub replicated_workloads: usize,
    pub last_heartbeat: DateTime<Utc>,
}

impl RegionMetrics {
    /// Healthy regions carry load and serve as failover targets.
    pub fn is_healthy(&self) -> bool {
        self.status == RegionStatus::Healthy
            && self.error_rate < 0.01
            && self.cpu_usage_percent < 85.0
    }
}

/// Distributed workload replicated across regions.
///
/// Invariant: while the workload is active, `primary_region` appears in
/// `replicas`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workload {
    pub workload_id: String,
    pub name: String,
    pub primary_region: String,
    pub backup_regions: Vec<String>,
    pub state: BTreeMap<String, serde_json::Value>,
    /// Per-region replica copies of the state
    pub replicas: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    pub consistency_level: ConsistencyLevel,
    pub created_at: DateTime<Utc>,
}

/// Record of a state change for replication.
///
/// `version` is the per-region logical clock value at the time of the
/// change; it increases monotonically within a region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    pub change_id: String,
    pub timestamp: DateTime<Utc>,
    pub region_id: String,
    pub workload_id: String,
    pub old_state: BTreeMap<String, serde_json::Value>,
    pub new_state: BTreeMap<String, serde_json::Value>,
    pub version: i64,
}

impl StateChange {
    /// Two changes conflict when they touch the same workload from different
    /// regions and their new-state key sets intersect.
    pub fn conflicts_with(&self, other: &StateChange) -> bool {
        self.workload_id == other.workload_id
            && self.region_id != other.region_id
            && self
                .new_state
                .keys()
                .any(|k| other.new_state.contains_key(k))
    }
}

/// Acknowledgement returned by a region replicator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaAck {
    pub region_id: String,
    pub ok: bool,
    /// Replication latency measured by the replicator itself (ms)
    pub latency_ms: f64,
}

/// Plan for failing workloads out of an unavailable region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverPlan {
    pub failed_region: String,
    pub affected_workloads: Vec<String>,
    /// Backup regions in selection order
    pub target_regions: Vec<String>,
    /// Scripted action list executed in sequence
    pub actions: Vec<String>,
    pub estimated_duration_seconds: f64,
    pub risk_level: String,
}

/// Result of a coordinated cross-region execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationResult {
    pub workflow_id: String,
    /// `success`, `partial`, or `failed`
    pub status: String,
    pub executed_regions: Vec<String>,
    pub failed_regions: Vec<String>,
    pub execution_time_ms: f64,
    /// Self-reported coordination overhead (ms)
    pub coordination_overhead_ms: f64,
    /// True iff no conflicts remain unresolved
    pub data_consistency_achieved: bool,
    pub failover_triggered: bool,
}

/// Capacity-weighted workload distribution across regions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadDistribution {
    /// region_id -> allocation fraction (sums to ~1.0)
    pub region_allocations: BTreeMap<String, f64>,
    pub estimated_latency_ms: f64,
    pub total_capacity_utilization: f64,
    /// 1.0 = perfectly even allocation
    pub balanced_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn change(region: &str, workload: &str, keys: &[&str]) -> StateChange {
        StateChange {
            change_id: format!("chg-{region}"),
            timestamp: Utc::now(),
            region_id: region.to_string(),
            workload_id: workload.to_string(),
            old_state: BTreeMap::new(),
            new_state: keys
                .iter()
                .map(|k| (k.to_string(), json!(1)))
                .collect(),
            version: 1,
        }
    }

    #[test]
    fn conflict_requires_overlapping_keys_and_distinct_regions() {
        let a = change("us-east", "w1", &["mode", "limit"]);
        let b = change("eu-west", "w1", &["limit"]);
        let c = change("eu-west", "w1", &["owner"]);
        let d = change("us-east", "w1", &["mode"]);

        assert!(a.conflicts_with(&b));
        assert!(!a.conflicts_with(&c));
        // Same region never conflicts with itself
        assert!(!a.conflicts_with(&d));
    }
}
