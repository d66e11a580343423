//! Query surface — read operations offered to the HTTP/WebSocket collaborator
//!
//! The HTTP surface itself (transport, auth tokens, rate limiting) lives in
//! an external collaborator. The core sees only a validated principal with
//! a scope set and offers the read operations here. Insufficient scope is a
//! policy violation reported at this boundary, never a panic.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::analytics::MetricTrend;
use crate::pipeline::EventPipeline;
use crate::types::{AggregatedMetrics, Anomaly, ThreatForecast};

/// Access scopes carried by a validated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scope {
    Read,
    Write,
    Admin,
    ThreatIntel,
    Metrics,
}

/// Validated caller identity, produced by the external auth collaborator.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: String,
    pub scopes: HashSet<Scope>,
}

impl Principal {
    pub fn new(id: &str, scopes: impl IntoIterator<Item = Scope>) -> Self {
        Self {
            id: id.to_string(),
            scopes: scopes.into_iter().collect(),
        }
    }

    fn has(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope) || self.scopes.contains(&Scope::Admin)
    }
}

/// Boundary errors surfaced to the collaborator.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("principal {principal} lacks scope {scope:?}")]
    InsufficientScope { principal: String, scope: Scope },

    #[error("unknown metric: {0}")]
    UnknownMetric(String),
}

/// Entity kinds accepted by threat analysis lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Ip,
    Domain,
    Hash,
    Certificate,
}

/// Threat analysis answer for one entity.
#[derive(Debug, Clone, Serialize)]
pub struct ThreatAnalysis {
    pub entity_type: EntityType,
    pub value: String,
    pub recent_detections: usize,
    pub recommendations: Vec<String>,
}

/// Read-only facade over the pipeline for the external surface.
pub struct QuerySurface {
    pipeline: Arc<EventPipeline>,
}

impl QuerySurface {
    pub fn new(pipeline: Arc<EventPipeline>) -> Self {
        Self { pipeline }
    }

    /// Window summaries for a set of metrics.
    pub fn metrics_query(
        &self,
        principal: &Principal,
        metric_names: &[String],
        window_seconds: u64,
    ) -> Result<BTreeMap<String, AggregatedMetrics>, QueryError> {
        require(principal, Scope::Metrics)?;
        let mut out = BTreeMap::new();
        for name in metric_names {
            if let Some(summary) = self.pipeline.aggregate(name, window_seconds) {
                out.insert(name.clone(), summary);
            }
        }
        Ok(out)
    }

    /// Recent anomalies for the caller, newest last.
    pub fn anomaly_detect(
        &self,
        principal: &Principal,
        limit: usize,
    ) -> Result<Vec<Anomaly>, QueryError> {
        require(principal, Scope::Read)?;
        Ok(self.pipeline.anomalies().recent_anomalies(limit))
    }

    /// Trend correlations for a set of metrics.
    pub fn correlations(
        &self,
        principal: &Principal,
        metric_names: &[String],
    ) -> Result<BTreeMap<String, MetricTrend>, QueryError> {
        require(principal, Scope::Metrics)?;
        Ok(metric_names
            .iter()
            .filter_map(|name| self.pipeline.trend(name).map(|t| (name.clone(), t)))
            .collect())
    }

    /// Threat probability forecast over the horizon.
    pub fn forecast(
        &self,
        principal: &Principal,
        current_threat_level: f64,
        horizon_hours: i64,
    ) -> Result<ThreatForecast, QueryError> {
        require(principal, Scope::Read)?;
        Ok(self
            .pipeline
            .forecaster()
            .forecast(current_threat_level, Duration::hours(horizon_hours)))
    }

    /// Threat context for one entity (intel scope).
    pub fn threat_analyze(
        &self,
        principal: &Principal,
        entity_type: EntityType,
        value: &str,
        include_recommendations: bool,
    ) -> Result<ThreatAnalysis, QueryError> {
        require(principal, Scope::ThreatIntel)?;
        let recent = self
            .pipeline
            .anomalies()
            .recent_anomalies(1_000)
            .into_iter()
            .filter(|a| a.metric_name.contains(value))
            .count();
        let recommendations = if include_recommendations {
            if recent > 0 {
                vec![
                    "Increase monitoring for this entity".to_string(),
                    "Review correlated alerts".to_string(),
                ]
            } else {
                vec!["No action required".to_string()]
            }
        } else {
            Vec::new()
        };
        Ok(ThreatAnalysis {
            entity_type,
            value: value.to_string(),
            recent_detections: recent,
            recommendations,
        })
    }

    /// Live-stream subscription: bus events for the named topics flow to
    /// the returned subscription (fan-out owned by the collaborator).
    pub fn live_stream(
        &self,
        principal: &Principal,
        bus: &crate::bus::EventBus,
        topic: &str,
    ) -> Result<crate::bus::Subscription, QueryError> {
        require(principal, Scope::Read)?;
        Ok(bus.subscribe(topic))
    }

    /// Timestamp helper for range queries at the boundary.
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

fn require(principal: &Principal, scope: Scope) -> Result<(), QueryError> {
    if principal.has(scope) {
        Ok(())
    } else {
        Err(QueryError::InsufficientScope {
            principal: principal.id.clone(),
            scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use crate::health::HealthMonitor;
    use crate::ingest::Batcher;
    use crate::response::{PlaybookRegistry, RemediationExecutor, WorkflowOrchestrator};
    use crate::types::TimeSeriesPoint;

    fn surface() -> QuerySurface {
        let bus = Arc::new(EventBus::from_config());
        let workflow = Arc::new(WorkflowOrchestrator::new(
            RemediationExecutor::new(vec![]),
            PlaybookRegistry::with_defaults(),
            Arc::clone(&bus),
            vec![],
        ));
        let pipeline = Arc::new(EventPipeline::new(
            Arc::new(Batcher::from_config()),
            workflow,
            bus,
            Arc::new(HealthMonitor::from_config()),
        ));
        for i in 0..50 {
            pipeline.ingest_metric(TimeSeriesPoint::new("cpu_usage", i as f64));
        }
        QuerySurface::new(pipeline)
    }

    #[test]
    fn metrics_scope_gates_metric_queries() {
        let surface = surface();
        let reader = Principal::new("reader", [Scope::Read]);
        let metrics = Principal::new("metrics", [Scope::Metrics]);
        let names = vec!["cpu_usage".to_string()];

        assert!(matches!(
            surface.metrics_query(&reader, &names, 86_400),
            Err(QueryError::InsufficientScope { .. })
        ));
        let summaries = surface.metrics_query(&metrics, &names, 86_400).unwrap();
        assert_eq!(summaries["cpu_usage"].count, 50);
    }

    #[test]
    fn admin_scope_implies_everything() {
        let surface = surface();
        let admin = Principal::new("root", [Scope::Admin]);
        assert!(surface.anomaly_detect(&admin, 10).is_ok());
        assert!(surface
            .metrics_query(&admin, &["cpu_usage".to_string()], 86_400)
            .is_ok());
        assert!(surface
            .threat_analyze(&admin, EntityType::Ip, "203.0.113.9", true)
            .is_ok());
    }

    #[test]
    fn unknown_metrics_are_simply_absent() {
        let surface = surface();
        let metrics = Principal::new("metrics", [Scope::Metrics]);
        let summaries = surface
            .metrics_query(&metrics, &["never_seen".to_string()], 60)
            .unwrap();
        assert!(summaries.is_empty());
    }

    #[test]
    fn forecast_requires_read_scope() {
        let surface = surface();
        let nobody = Principal::new("nobody", None);
        assert!(surface.forecast(&nobody, 0.3, 48).is_err());

        let reader = Principal::new("reader", [Scope::Read]);
        let forecast = surface.forecast(&reader, 0.3, 48).unwrap();
        assert!((0.0..=1.0).contains(&forecast.threat_probability));
    }
}
