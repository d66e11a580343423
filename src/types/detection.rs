//! Detection-stage types: traffic events fed to the feature extractor,
//! anomalies raised by the statistical detector, and classification results
//! produced by the ML ensemble.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Single network traffic event observed by an upstream sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficEvent {
    pub timestamp: DateTime<Utc>,
    pub source_ip: String,
    pub destination_ip: String,
    pub port: u16,
    pub protocol: String,
    pub packet_size: u32,
    pub flags: Vec<String>,
    pub ttl: u8,
    pub window_size: u32,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Kinds of detected metric anomalies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnomalyKind {
    /// |v − mean| / stddev exceeded the z threshold
    Statistical,
    /// Rate-of-change deviated from the recent delta distribution
    Temporal,
    /// Set by higher-layer behavioral profiling
    Behavioral,
}

/// Baseline context recorded with an anomaly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyContext {
    pub baseline_mean: f64,
    pub baseline_std_dev: f64,
    pub z_score: f64,
}

/// Detected metric anomaly. `kinds` is non-empty whenever one exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub timestamp: DateTime<Utc>,
    pub metric_name: String,
    pub value: f64,
    /// (lo, hi) band the value was expected to fall in
    pub expected_range: (f64, f64),
    pub kinds: Vec<AnomalyKind>,
    /// Detection confidence in [0, 1]
    pub confidence: f64,
    /// Normalized severity in [0, 1]
    pub severity: f64,
    pub context: AnomalyContext,
}

/// Threat severity classifications produced by the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreatClassification {
    Benign,
    Suspicious,
    Malicious,
    Critical,
    Catastrophic,
}

impl std::fmt::Display for ThreatClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreatClassification::Benign => write!(f, "BENIGN"),
            ThreatClassification::Suspicious => write!(f, "SUSPICIOUS"),
            ThreatClassification::Malicious => write!(f, "MALICIOUS"),
            ThreatClassification::Critical => write!(f, "CRITICAL"),
            ThreatClassification::Catastrophic => write!(f, "CATASTROPHIC"),
        }
    }
}

/// Result of an ensemble detection pass.
///
/// Invariant: `threat_detected` holds exactly when `classification` is not
/// [`ThreatClassification::Benign`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub threat_detected: bool,
    pub classification: ThreatClassification,
    /// Arithmetic mean of the detector confidences, in [0, 1]
    pub confidence: f64,
    /// Threat score in [0, 100]
    pub score: f64,
    /// Inferred primary threat type (e.g. `port_scan`, `dos_attack`)
    pub primary_type: String,
    /// Per-detector confidence votes
    pub contributing_models: BTreeMap<String, f64>,
    /// Feature groups that fired during extraction
    pub features_triggered: Vec<String>,
    pub recommendation: String,
    pub timestamp: DateTime<Utc>,
}

impl DetectionResult {
    /// A benign result with zero score, used when consensus is not reached.
    pub fn benign(
        primary_type: String,
        contributing_models: BTreeMap<String, f64>,
        confidence: f64,
    ) -> Self {
        Self {
            threat_detected: false,
            classification: ThreatClassification::Benign,
            confidence,
            score: 0.0,
            primary_type,
            contributing_models,
            features_triggered: Vec::new(),
            recommendation: "No action required".to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_result_upholds_detection_invariant() {
        let result = DetectionResult::benign("unknown".to_string(), BTreeMap::new(), 0.2);
        assert!(!result.threat_detected);
        assert_eq!(result.classification, ThreatClassification::Benign);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn classification_ordering_tracks_severity() {
        assert!(ThreatClassification::Benign < ThreatClassification::Suspicious);
        assert!(ThreatClassification::Critical < ThreatClassification::Catastrophic);
    }
}
