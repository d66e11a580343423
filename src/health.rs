//! Health Monitor — per-component rolling latency/error stats
//!
//! Every instrumented component records operation latency and outcome into
//! a bounded deque. A component is healthy while its error rate stays under
//! the configured ceiling and its average latency under the latency bound.
//! The derived system state is `healthy` when all components are healthy,
//! `degraded` when some are, and `critical` when none remain.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use tracing::warn;

/// Derived whole-system state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemState {
    Healthy,
    Degraded,
    Critical,
}

impl std::fmt::Display for SystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemState::Healthy => write!(f, "healthy"),
            SystemState::Degraded => write!(f, "degraded"),
            SystemState::Critical => write!(f, "critical"),
        }
    }
}

/// Health snapshot for one component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentReport {
    pub name: String,
    pub operations: u64,
    pub failures: u64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub is_healthy: bool,
}

/// Whole-system health snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SystemReport {
    pub state: SystemState,
    pub components: BTreeMap<String, ComponentReport>,
}

#[derive(Default)]
struct ComponentStats {
    latencies_ms: VecDeque<f64>,
    successes: u64,
    failures: u64,
}

/// Rolling per-component health tracker.
pub struct HealthMonitor {
    latency_window: usize,
    error_rate_max: f64,
    latency_max_ms: f64,
    components: Mutex<HashMap<String, ComponentStats>>,
}

impl HealthMonitor {
    pub fn new(latency_window: usize, error_rate_max: f64, latency_max_ms: f64) -> Self {
        Self {
            latency_window,
            error_rate_max,
            latency_max_ms,
            components: Mutex::new(HashMap::new()),
        }
    }

    /// Build from the global configuration.
    pub fn from_config() -> Self {
        let cfg = &crate::config::get().health;
        Self::new(cfg.latency_window, cfg.error_rate_max, cfg.latency_max_ms)
    }

    /// Record one operation for a component.
    pub fn record_operation(&self, component: &str, latency_ms: f64, ok: bool) {
        let mut components = self.components.lock().expect("health registry lock poisoned");
        let stats = components
            .entry(component.to_string())
            .or_insert_with(ComponentStats::default);
        stats.latencies_ms.push_back(latency_ms);
        while stats.latencies_ms.len() > self.latency_window {
            stats.latencies_ms.pop_front();
        }
        if ok {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
    }

    /// Health of one component, when it has recorded operations.
    pub fn component_report(&self, component: &str) -> Option<ComponentReport> {
        let components = self.components.lock().expect("health registry lock poisoned");
        components
            .get(component)
            .map(|stats| self.build_report(component, stats))
    }

    /// Full system report with the derived overall state.
    pub fn system_report(&self) -> SystemReport {
        let components = self.components.lock().expect("health registry lock poisoned");
        let reports: BTreeMap<String, ComponentReport> = components
            .iter()
            .map(|(name, stats)| (name.clone(), self.build_report(name, stats)))
            .collect();

        let healthy = reports.values().filter(|r| r.is_healthy).count();
        let state = if reports.is_empty() || healthy == reports.len() {
            SystemState::Healthy
        } else if healthy > 0 {
            SystemState::Degraded
        } else {
            SystemState::Critical
        };

        if state != SystemState::Healthy {
            warn!(
                state = %state,
                healthy = healthy,
                total = reports.len(),
                "System health below healthy"
            );
        }

        SystemReport {
            state,
            components: reports,
        }
    }

    fn build_report(&self, name: &str, stats: &ComponentStats) -> ComponentReport {
        let operations = stats.successes + stats.failures;
        let error_rate = if operations > 0 {
            stats.failures as f64 / operations as f64
        } else {
            0.0
        };
        let avg_latency_ms = if stats.latencies_ms.is_empty() {
            0.0
        } else {
            stats.latencies_ms.iter().sum::<f64>() / stats.latencies_ms.len() as f64
        };
        ComponentReport {
            name: name.to_string(),
            operations,
            failures: stats.failures,
            error_rate,
            avg_latency_ms,
            is_healthy: error_rate < self.error_rate_max && avg_latency_ms < self.latency_max_ms,
        }
    }
}
