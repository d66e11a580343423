//! Event Pipeline — end-to-end coordination from raw event to response
//!
//! Owns every processing stage and sequences them per event. Within a
//! single source, events are processed in receipt order; duplicate events
//! drop at the front and never reach enrichment. Metric-bearing events
//! feed the analytic stages; threat-bearing events additionally run the
//! detection ensemble and, when a threat is confirmed, the response
//! workflow.

use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::analytics::{Aggregator, AnomalyDetector, Forecaster, TrendAnalyzer, WindowStore};
use crate::bus::EventBus;
use crate::detection::ThreatDetector;
use crate::health::HealthMonitor;
use crate::identity;
use crate::ingest::{Batcher, Deduplicator, Enricher};
use crate::response::{WorkflowOrchestrator, WorkflowResult};
use crate::types::{
    EnrichedEvent, EventKind, RawEvent, ThreatHistoryEvent, ThreatSignal, TimeSeriesPoint,
    TrafficEvent,
};

/// End-to-end event pipeline.
pub struct EventPipeline {
    dedup: Deduplicator,
    enricher: Enricher,
    batcher: Arc<Batcher>,
    windows: Arc<WindowStore>,
    aggregator: Aggregator,
    anomalies: Arc<AnomalyDetector>,
    trends: TrendAnalyzer,
    detector: ThreatDetector,
    forecaster: Arc<Forecaster>,
    workflow: Arc<WorkflowOrchestrator>,
    health: Arc<HealthMonitor>,
    bus: Arc<EventBus>,
    events_processed: AtomicU64,
    duplicates_dropped: AtomicU64,
    threats_confirmed: AtomicU64,
    malformed_dropped: AtomicU64,
}

/// Pipeline statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineStats {
    pub events_processed: u64,
    pub duplicates_dropped: u64,
    pub threats_confirmed: u64,
    pub malformed_dropped: u64,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipeline: {} events ({} duplicates, {} malformed), {} threats confirmed",
            self.events_processed,
            self.duplicates_dropped,
            self.malformed_dropped,
            self.threats_confirmed
        )
    }
}

impl EventPipeline {
    pub fn new(
        batcher: Arc<Batcher>,
        workflow: Arc<WorkflowOrchestrator>,
        bus: Arc<EventBus>,
        health: Arc<HealthMonitor>,
    ) -> Self {
        info!("Initializing event pipeline");
        let windows = Arc::new(WindowStore::from_config());
        Self {
            dedup: Deduplicator::from_config(),
            enricher: Enricher::from_config(),
            batcher,
            aggregator: Aggregator::new(Arc::clone(&windows)),
            windows,
            anomalies: Arc::new(AnomalyDetector::from_config()),
            trends: TrendAnalyzer::from_config(),
            detector: ThreatDetector::with_default_models(),
            forecaster: Arc::new(Forecaster::from_config()),
            workflow,
            health,
            bus,
            events_processed: AtomicU64::new(0),
            duplicates_dropped: AtomicU64::new(0),
            threats_confirmed: AtomicU64::new(0),
            malformed_dropped: AtomicU64::new(0),
        }
    }

    /// Process one raw event through the full pipeline.
    ///
    /// Returns the enriched event when it was accepted (not a duplicate),
    /// plus the workflow result when a threat ran the response chain.
    pub async fn process_event(
        &self,
        event: RawEvent,
    ) -> (Option<EnrichedEvent>, Option<WorkflowResult>) {
        let cycle_start = Instant::now();

        // STAGE 0: input validation.
        if event.source.is_empty() {
            self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Event rejected: empty source");
            return (None, None);
        }

        // STAGE 1: deduplication.
        if self.dedup.is_duplicate(&event) {
            self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(source = %event.source, "Duplicate event dropped");
            self.health
                .record_operation("dedup", ms_since(cycle_start), true);
            return (None, None);
        }

        // STAGE 2: enrichment (exactly once per accepted event).
        let enriched = self.enricher.enrich(&event);
        self.events_processed.fetch_add(1, Ordering::Relaxed);

        // STAGE 3: batching toward persistence sinks.
        self.batcher.add_event(enriched.clone()).await;

        // STAGE 4-5: metric analytics.
        for point in metric_points(&event) {
            self.ingest_metric(point);
        }

        // STAGE 6-7: threat path.
        let workflow_result = if event.kind == EventKind::ThreatDetection
            || event.kind == EventKind::SecurityAlert
        {
            self.run_threat_path(&event, &enriched).await
        } else {
            None
        };

        self.health
            .record_operation("pipeline", ms_since(cycle_start), true);
        (Some(enriched), workflow_result)
    }

    /// Ingest one metric point: window store, anomaly test, trend.
    pub fn ingest_metric(&self, point: TimeSeriesPoint) {
        let start = Instant::now();
        self.windows.add_point(point.clone());
        self.trends.add_point(&point);
        if let Some(anomaly) = self.anomalies.record(&point) {
            warn!(
                metric = %anomaly.metric_name,
                value = anomaly.value,
                severity = anomaly.severity,
                kinds = ?anomaly.kinds,
                "Metric anomaly detected"
            );
            self.bus.publish_json(
                "anomaly_detected",
                json!({
                    "metric": anomaly.metric_name,
                    "value": anomaly.value,
                    "severity": anomaly.severity,
                    "kinds": anomaly.kinds,
                }),
            );
        }
        self.health
            .record_operation("analytics", ms_since(start), true);
    }

    /// Detection ensemble plus response workflow for threat-bearing events.
    async fn run_threat_path(
        &self,
        event: &RawEvent,
        enriched: &EnrichedEvent,
    ) -> Option<WorkflowResult> {
        let start = Instant::now();
        let traffic = traffic_events(event);
        let detection = self.detector.detect(&traffic);
        self.health
            .record_operation("detection", ms_since(start), true);

        if !detection.threat_detected {
            return None;
        }
        self.threats_confirmed.fetch_add(1, Ordering::Relaxed);

        // Forecast history records the confirmed threat.
        self.forecaster.record_event(ThreatHistoryEvent {
            timestamp: event.timestamp,
            threat_type: detection.primary_type.clone(),
            severity: detection.confidence,
            duration_minutes: 0.0,
            response_time_ms: ms_since(start),
            success: true,
        });

        let signal = ThreatSignal {
            threat_id: identity::event_id(),
            timestamp: event.timestamp,
            source: event.source.clone(),
            threat_type: if detection.primary_type == "unknown" {
                event.threat_type().unwrap_or("anomalous_traffic").to_string()
            } else {
                detection.primary_type.clone()
            },
            fingerprint: enriched.original_hash.clone(),
            affected_assets: event.affected_nodes(),
            detection,
            factors: None,
        };

        let workflow_start = Instant::now();
        let result = self.workflow.handle_threat(signal).await;
        self.health.record_operation(
            "workflow",
            ms_since(workflow_start),
            !matches!(result.status, crate::response::WorkflowStatus::Failed),
        );
        Some(result)
    }

    /// Aggregated summary access (query surface).
    pub fn aggregate(&self, metric: &str, window_seconds: u64) -> Option<crate::types::AggregatedMetrics> {
        self.aggregator.aggregate(metric, window_seconds)
    }

    /// The forecaster handle (query surface, scheduled forecasts).
    pub fn forecaster(&self) -> Arc<Forecaster> {
        Arc::clone(&self.forecaster)
    }

    /// The anomaly detector handle (query surface, behavioral flags).
    pub fn anomalies(&self) -> Arc<AnomalyDetector> {
        Arc::clone(&self.anomalies)
    }

    /// Trend for a metric, when computed.
    pub fn trend(&self, metric: &str) -> Option<crate::analytics::MetricTrend> {
        self.trends.trend(metric)
    }

    /// The ensemble detector; the embedding binary bridges model promotion
    /// to `DetectorModel::set_params` through this handle.
    pub fn detector(&self) -> &ThreatDetector {
        &self.detector
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            threats_confirmed: self.threats_confirmed.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
        }
    }

    /// Stage statistics bundle for the status surface.
    pub fn stage_stats(&self) -> serde_json::Value {
        json!({
            "pipeline": self.stats(),
            "dedup": self.dedup.stats(),
            "enricher": self.enricher.stats(),
            "batcher": self.batcher.stats(),
            "windows": self.windows.stats(),
            "anomalies": self.anomalies.stats(),
            "detector": self.detector.stats(),
        })
    }
}

fn ms_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1_000.0
}

/// Metric points carried by an event's payload.
///
/// Network/performance metric events expose `{"metrics": {name: value}}`
/// and optionally a flat `"value"` with the metric named after the source.
fn metric_points(event: &RawEvent) -> Vec<TimeSeriesPoint> {
    let mut points = Vec::new();
    if let Some(metrics) = event.payload.get("metrics").and_then(|m| m.as_object()) {
        for (name, value) in metrics {
            if let Some(v) = value.as_f64() {
                let mut point = TimeSeriesPoint::new(name.clone(), v);
                point.timestamp = event.timestamp;
                point.tags.insert("source".to_string(), event.source.clone());
                points.push(point);
            }
        }
    }
    if let Some(v) = event.payload.get("value").and_then(|v| v.as_f64()) {
        let name = event
            .payload
            .get("metric_name")
            .and_then(|n| n.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.value", event.source));
        let mut point = TimeSeriesPoint::new(name, v);
        point.timestamp = event.timestamp;
        points.push(point);
    }
    points
}

/// Traffic events embedded in a threat event's payload under `"traffic"`.
fn traffic_events(event: &RawEvent) -> Vec<TrafficEvent> {
    event
        .payload
        .get("traffic")
        .and_then(|t| serde_json::from_value::<Vec<TrafficEvent>>(t.clone()).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn pipeline() -> EventPipeline {
        let bus = Arc::new(EventBus::from_config());
        let workflow = Arc::new(WorkflowOrchestrator::new(
            crate::response::RemediationExecutor::new(vec![]),
            crate::response::PlaybookRegistry::with_defaults(),
            Arc::clone(&bus),
            vec![],
        ));
        EventPipeline::new(
            Arc::new(Batcher::from_config()),
            workflow,
            bus,
            Arc::new(HealthMonitor::from_config()),
        )
    }

    fn metric_event(value: f64) -> RawEvent {
        let mut payload = BTreeMap::new();
        payload.insert("value".to_string(), json!(value));
        payload.insert("metric_name".to_string(), json!("cpu_usage"));
        RawEvent {
            timestamp: Utc::now(),
            source: "node-1".to_string(),
            kind: EventKind::PerformanceMetric,
            payload,
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn duplicate_events_drop_before_enrichment() {
        let pipeline = pipeline();
        let event = metric_event(1.0);
        let (first, _) = pipeline.process_event(event.clone()).await;
        assert!(first.is_some());
        let (second, _) = pipeline.process_event(event).await;
        assert!(second.is_none());
        assert_eq!(pipeline.stats().duplicates_dropped, 1);
    }

    #[tokio::test]
    async fn metric_events_feed_the_aggregator() {
        let pipeline = pipeline();
        for i in 0..20 {
            pipeline.process_event(metric_event(i as f64)).await;
        }
        let summary = pipeline.aggregate("cpu_usage", 86_400).expect("summary");
        assert_eq!(summary.count, 20);
        assert_eq!(summary.min, 0.0);
        assert_eq!(summary.max, 19.0);
    }

    #[tokio::test]
    async fn malformed_events_are_counted_and_dropped() {
        let pipeline = pipeline();
        let mut event = metric_event(1.0);
        event.source = String::new();
        let (enriched, _) = pipeline.process_event(event).await;
        assert!(enriched.is_none());
        assert_eq!(pipeline.stats().malformed_dropped, 1);
    }

    #[tokio::test]
    async fn non_threat_events_skip_the_workflow() {
        let pipeline = pipeline();
        let (_, workflow) = pipeline.process_event(metric_event(1.0)).await;
        assert!(workflow.is_none());
    }
}
