//! Load balancer — capacity-weighted workload distribution across regions
//!
//! Healthy regions receive allocations proportional to their free CPU
//! capacity; when no region is healthy the load spreads evenly as a
//! fallback. The balance score rewards even allocations.

use std::collections::BTreeMap;
use tracing::debug;

use crate::types::{LoadDistribution, RegionMetrics};

/// Capacity-weighted region load balancer.
pub struct LoadBalancer;

impl LoadBalancer {
    pub fn new() -> Self {
        Self
    }

    /// Distribute load across regions by free capacity.
    pub fn distribute(&self, region_metrics: &BTreeMap<String, RegionMetrics>) -> LoadDistribution {
        let healthy: BTreeMap<&String, &RegionMetrics> = region_metrics
            .iter()
            .filter(|(_, m)| m.is_healthy())
            .collect();

        if healthy.is_empty() {
            let count = region_metrics.len().max(1);
            let per_region = 1.0 / count as f64;
            return LoadDistribution {
                region_allocations: region_metrics
                    .keys()
                    .map(|r| (r.clone(), per_region))
                    .collect(),
                estimated_latency_ms: 100.0,
                total_capacity_utilization: 0.5,
                balanced_score: 0.5,
            };
        }

        let total_capacity: f64 = healthy
            .values()
            .map(|m| (100.0 - m.cpu_usage_percent) / 100.0)
            .sum();

        let allocations: BTreeMap<String, f64> = healthy
            .iter()
            .map(|(region_id, m)| {
                let capacity = (100.0 - m.cpu_usage_percent) / (100.0 * total_capacity);
                ((*region_id).clone(), capacity)
            })
            .collect();

        let estimated_latency_ms = region_metrics
            .iter()
            .map(|(r, m)| m.latency_ms * allocations.get(r).copied().unwrap_or(0.0))
            .sum();
        let total_capacity_utilization = region_metrics
            .iter()
            .map(|(r, m)| m.cpu_usage_percent * allocations.get(r).copied().unwrap_or(0.0))
            .sum::<f64>()
            / 100.0;
        let balanced_score = balance_score(&allocations);

        debug!(
            healthy = healthy.len(),
            balanced_score = balanced_score,
            "Load distribution computed"
        );

        LoadDistribution {
            region_allocations: allocations,
            estimated_latency_ms,
            total_capacity_utilization,
            balanced_score,
        }
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new()
    }
}

/// 1.0 for perfectly even allocations, decaying with variance.
fn balance_score(allocations: &BTreeMap<String, f64>) -> f64 {
    if allocations.is_empty() {
        return 0.0;
    }
    let values: Vec<f64> = allocations.values().copied().collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (1.0 - variance).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RegionStatus;
    use chrono::Utc;

    fn metrics(region: &str, status: RegionStatus, cpu: f64) -> (String, RegionMetrics) {
        (
            region.to_string(),
            RegionMetrics {
                region_id: region.to_string(),
                status,
                latency_ms: 20.0,
                throughput_rps: 100.0,
                error_rate: 0.001,
                cpu_usage_percent: cpu,
                memory_usage_percent: 50.0,
                replicated_workloads: 1,
                last_heartbeat: Utc::now(),
            },
        )
    }

    #[test]
    fn allocations_track_free_capacity() {
        let balancer = LoadBalancer::new();
        let regions: BTreeMap<_, _> = [
            metrics("us-east", RegionStatus::Healthy, 20.0),
            metrics("eu-west", RegionStatus::Healthy, 60.0),
        ]
        .into_iter()
        .collect();

        let distribution = balancer.distribute(&regions);
        let us = distribution.region_allocations["us-east"];
        let eu = distribution.region_allocations["eu-west"];
        assert!(us > eu);
        assert!((us + eu - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unhealthy_regions_receive_nothing() {
        let balancer = LoadBalancer::new();
        let regions: BTreeMap<_, _> = [
            metrics("us-east", RegionStatus::Healthy, 50.0),
            metrics("eu-west", RegionStatus::Unavailable, 10.0),
        ]
        .into_iter()
        .collect();

        let distribution = balancer.distribute(&regions);
        assert!(distribution.region_allocations.contains_key("us-east"));
        assert!(!distribution.region_allocations.contains_key("eu-west"));
    }

    #[test]
    fn no_healthy_regions_falls_back_to_even_spread() {
        let balancer = LoadBalancer::new();
        let regions: BTreeMap<_, _> = [
            metrics("us-east", RegionStatus::Unavailable, 90.0),
            metrics("eu-west", RegionStatus::Degraded, 95.0),
        ]
        .into_iter()
        .collect();

        let distribution = balancer.distribute(&regions);
        assert_eq!(distribution.region_allocations.len(), 2);
        assert!((distribution.region_allocations["us-east"] - 0.5).abs() < 1e-9);
        assert_eq!(distribution.balanced_score, 0.5);
    }
}
