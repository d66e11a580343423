//! Ingestion-stage event types: raw events from upstream sensors, enriched
//! events produced exactly once per accepted raw event, and the time-series
//! point/summary shapes consumed by the analytics stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Classification of inbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ThreatDetection,
    NetworkMetric,
    SystemEvent,
    SecurityAlert,
    PerformanceMetric,
}

impl EventKind {
    /// Wire tag used in the canonical fingerprint encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ThreatDetection => "threat_detection",
            EventKind::NetworkMetric => "network_metric",
            EventKind::SystemEvent => "system_event",
            EventKind::SecurityAlert => "security_alert",
            EventKind::PerformanceMetric => "performance_metric",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event severity assigned during enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Raw event from detection or monitoring systems.
///
/// Payload and metadata are open-ended maps; `BTreeMap` keeps keys sorted so
/// the canonical fingerprint encoding is deterministic. Immutable after
/// construction — the pipeline never mutates a raw event, it either drops it
/// (duplicate) or upgrades it to an [`EnrichedEvent`] exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event timestamp (UTC, monotonic within a source)
    pub timestamp: DateTime<Utc>,
    /// Opaque source identifier (sensor, node, detector)
    pub source: String,
    /// Event kind tag
    pub kind: EventKind,
    /// Free-form payload map
    pub payload: BTreeMap<String, serde_json::Value>,
    /// Free-form metadata map
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RawEvent {
    /// The `threat_score` payload field, when present and numeric.
    pub fn threat_score(&self) -> Option<f64> {
        self.payload.get("threat_score").and_then(|v| v.as_f64())
    }

    /// The `threat_type` payload field, when present.
    pub fn threat_type(&self) -> Option<&str> {
        self.payload.get("threat_type").and_then(|v| v.as_str())
    }

    /// The `affected_nodes` payload field as a string list.
    pub fn affected_nodes(&self) -> Vec<String> {
        self.payload
            .get("affected_nodes")
            .and_then(|v| v.as_array())
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|n| n.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Threat-intel context attached during enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatContext {
    pub threat_type: String,
    /// Whether the threat type exists in the intel table
    pub known: bool,
    pub previous_incidents: u64,
    /// Free-text description from the intel table, if any
    pub description: Option<String>,
}

impl ThreatContext {
    /// Context for a threat type absent from the intel table.
    pub fn unknown(threat_type: &str) -> Self {
        Self {
            threat_type: threat_type.to_string(),
            known: false,
            previous_incidents: 0,
            description: None,
        }
    }
}

/// Source reputation snapshot attached during enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReputation {
    pub source: String,
    /// Trust score in [0, 1]
    pub trust_score: f64,
    pub previous_events: u64,
}

/// Historical-pattern summary attached during enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSummary {
    /// Events seen from this source inside the correlation window
    pub recent_from_source: usize,
    /// Events of this kind inside the correlation window
    pub recent_of_kind: usize,
}

/// Full enrichment block on an [`EnrichedEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrichment {
    pub threat_context: ThreatContext,
    pub source_reputation: SourceReputation,
    pub historical_patterns: PatternSummary,
}

/// Event with severity, correlations, and context. Created from a
/// [`RawEvent`] exactly once, then immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub kind: EventKind,
    pub severity: Severity,
    pub payload: BTreeMap<String, serde_json::Value>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub enrichment: Enrichment,
    /// Fingerprints of correlated events seen inside the correlation window
    pub correlations: Vec<String>,
    /// Fingerprint of the originating raw event
    pub original_hash: String,
    pub processed_at: DateTime<Utc>,
}

/// Single point in a metric time series. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub metric_name: String,
    pub value: f64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl TimeSeriesPoint {
    pub fn new(metric_name: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            metric_name: metric_name.into(),
            value,
            tags: BTreeMap::new(),
        }
    }
}

/// Summary statistics for a (metric, window) pair. Derived; only produced
/// when the window holds at least two points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub metric_name: String,
    pub count: usize,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}
