//! ML Ensemble — three detectors vote; consensus and averaged confidence
//! drive the classification
//!
//! Detectors live behind the [`DetectorModel`] trait so the set is swappable
//! in tests and the training orchestrator can retune parameters atomically.
//! Consensus requires at least 2/3 threat votes; confidence is the
//! arithmetic mean of the three detector confidences. When consensus fails,
//! or the averaged confidence stays below the SUSPICIOUS threshold, the
//! result is BENIGN with a zero score so `threat_detected` always agrees
//! with the classification.

use arc_swap::ArcSwap;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::types::{DetectionResult, ThreatClassification, TrafficEvent};

use super::features::{FeatureExtractor, FeatureSet};

/// One detector's vote on a feature vector.
#[derive(Debug, Clone)]
pub struct DetectorVote {
    pub is_threat: bool,
    pub confidence: f64,
}

/// Tunable parameters shared by the bundled detectors. The training
/// orchestrator swaps these atomically; detectors read the active pointer
/// per call.
#[derive(Debug, Clone)]
pub struct DetectorParams {
    pub threshold: f64,
    pub scale: f64,
}

/// A threat detection model in the ensemble.
pub trait DetectorModel: Send + Sync {
    /// Model identifier used in `contributing_models`.
    fn name(&self) -> &str;

    /// Vote on a combined feature vector.
    fn detect(&self, features: &[f64]) -> DetectorVote;

    /// Swap the active parameter set (training promotion path).
    fn set_params(&self, params: DetectorParams);
}

// ============================================================================
// Bundled detectors
// ============================================================================

/// Isolation-style detector: vectors far from the origin in feature space
/// are easier to isolate and score higher.
pub struct IsolationScoreModel {
    params: ArcSwap<DetectorParams>,
}

impl IsolationScoreModel {
    pub fn new() -> Self {
        Self {
            params: ArcSwap::from_pointee(DetectorParams {
                threshold: 0.5,
                scale: 100.0,
            }),
        }
    }
}

impl Default for IsolationScoreModel {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorModel for IsolationScoreModel {
    fn name(&self) -> &str {
        "isolation_score"
    }

    fn detect(&self, features: &[f64]) -> DetectorVote {
        let params = self.params.load();
        let norm = features.iter().map(|v| v * v).sum::<f64>().sqrt();
        let score = (norm / ((features.len() as f64 + 1.0) * params.scale)).min(1.0);
        DetectorVote {
            is_threat: score > params.threshold,
            confidence: score,
        }
    }

    fn set_params(&self, params: DetectorParams) {
        self.params.store(Arc::new(params));
    }
}

/// Sequence-reconstruction detector: keeps an exponential moving average of
/// past feature vectors and scores by normalized reconstruction error.
pub struct SequenceReconstructionModel {
    params: ArcSwap<DetectorParams>,
    ewma: Mutex<Option<Vec<f64>>>,
    alpha: f64,
}

impl SequenceReconstructionModel {
    pub fn new() -> Self {
        Self {
            params: ArcSwap::from_pointee(DetectorParams {
                threshold: 0.6,
                scale: 1.0,
            }),
            ewma: Mutex::new(None),
            alpha: 0.2,
        }
    }
}

impl Default for SequenceReconstructionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorModel for SequenceReconstructionModel {
    fn name(&self) -> &str {
        "sequence_reconstruction"
    }

    fn detect(&self, features: &[f64]) -> DetectorVote {
        let params = self.params.load();
        let mut ewma = self.ewma.lock().expect("ewma lock poisoned");

        let error = match ewma.as_mut() {
            None => {
                *ewma = Some(features.to_vec());
                0.0
            }
            Some(baseline) if baseline.len() != features.len() => {
                *baseline = features.to_vec();
                0.0
            }
            Some(baseline) => {
                let mut abs_error = 0.0;
                let mut magnitude = 0.0;
                for (b, &x) in baseline.iter_mut().zip(features) {
                    abs_error += (x - *b).abs();
                    magnitude += b.abs();
                    *b = *b * (1.0 - self.alpha) + x * self.alpha;
                }
                (abs_error / (magnitude + 1.0) / params.scale).min(1.0)
            }
        };

        DetectorVote {
            is_threat: error > params.threshold,
            confidence: error,
        }
    }

    fn set_params(&self, params: DetectorParams) {
        self.params.store(Arc::new(params));
    }
}

/// Bayesian-posterior detector: posterior threat probability from the mean
/// absolute feature magnitude.
pub struct BayesianPosteriorModel {
    params: ArcSwap<DetectorParams>,
}

impl BayesianPosteriorModel {
    pub fn new() -> Self {
        Self {
            params: ArcSwap::from_pointee(DetectorParams {
                threshold: 0.5,
                scale: 100.0,
            }),
        }
    }
}

impl Default for BayesianPosteriorModel {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorModel for BayesianPosteriorModel {
    fn name(&self) -> &str {
        "bayesian_posterior"
    }

    fn detect(&self, features: &[f64]) -> DetectorVote {
        let params = self.params.load();
        if features.is_empty() {
            return DetectorVote {
                is_threat: false,
                confidence: 0.0,
            };
        }
        let mean_abs =
            features.iter().map(|v| v.abs()).sum::<f64>() / features.len() as f64;
        let posterior = (mean_abs / params.scale).min(1.0);
        DetectorVote {
            is_threat: posterior > params.threshold,
            confidence: posterior,
        }
    }

    fn set_params(&self, params: DetectorParams) {
        self.params.store(Arc::new(params));
    }
}

// ============================================================================
// Ensemble coordinator
// ============================================================================

/// Ensemble-based threat detector.
pub struct ThreatDetector {
    models: Vec<Arc<dyn DetectorModel>>,
    extractor: FeatureExtractor,
    ensemble_threshold: usize,
    history: Mutex<VecDeque<DetectionResult>>,
}

/// Detection statistics over the retained history.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ThreatDetectorStats {
    pub total_analyzed: usize,
    pub threats_detected: usize,
    pub detection_rate: f64,
    pub avg_confidence: f64,
}

impl ThreatDetector {
    /// Ensemble over an explicit model set (tests inject mock detectors).
    pub fn new(models: Vec<Arc<dyn DetectorModel>>) -> Self {
        let cfg = &crate::config::get().detection;
        Self {
            models,
            extractor: FeatureExtractor::new(cfg.feature_history),
            ensemble_threshold: cfg.ensemble_threshold,
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Ensemble with the three bundled detectors.
    pub fn with_default_models() -> Self {
        Self::new(vec![
            Arc::new(IsolationScoreModel::new()),
            Arc::new(SequenceReconstructionModel::new()),
            Arc::new(BayesianPosteriorModel::new()),
        ])
    }

    /// The model set, for parameter promotion by the training orchestrator.
    pub fn models(&self) -> &[Arc<dyn DetectorModel>] {
        &self.models
    }

    /// Run the ensemble over recent traffic.
    pub fn detect(&self, traffic: &[TrafficEvent]) -> DetectionResult {
        let features = self.extractor.extract(traffic);
        self.detect_with_features(&features, traffic)
    }

    /// Run the ensemble over pre-extracted features.
    pub fn detect_with_features(
        &self,
        features: &FeatureSet,
        traffic: &[TrafficEvent],
    ) -> DetectionResult {
        let vector = features.to_vector();

        let mut votes: BTreeMap<String, f64> = BTreeMap::new();
        let mut threat_indicators = 0usize;
        for model in &self.models {
            let vote = model.detect(&vector);
            if vote.is_threat {
                threat_indicators += 1;
            }
            votes.insert(model.name().to_string(), vote.confidence);
        }

        let consensus = threat_indicators >= self.ensemble_threshold;
        let avg_confidence = if votes.is_empty() {
            0.0
        } else {
            votes.values().sum::<f64>() / votes.len() as f64
        };

        let primary_type = determine_threat_type(traffic);
        let classification = classify(consensus, avg_confidence);

        let result = if classification == ThreatClassification::Benign {
            DetectionResult::benign(primary_type, votes, avg_confidence)
        } else {
            DetectionResult {
                threat_detected: true,
                classification,
                confidence: avg_confidence,
                score: avg_confidence * 100.0,
                primary_type,
                contributing_models: votes,
                features_triggered: features.triggered(),
                recommendation: recommendation_for(classification),
                timestamp: Utc::now(),
            }
        };

        if result.threat_detected {
            warn!(
                classification = %result.classification,
                confidence = result.confidence,
                score = result.score,
                threat_type = %result.primary_type,
                "Threat detected by ensemble"
            );
        } else {
            debug!(confidence = avg_confidence, "Ensemble pass benign");
        }

        let mut history = self.history.lock().expect("detection history lock poisoned");
        history.push_back(result.clone());
        while history.len() > crate::config::defaults::DETECTION_HISTORY_SIZE {
            history.pop_front();
        }

        result
    }

    pub fn stats(&self) -> ThreatDetectorStats {
        let history = self.history.lock().expect("detection history lock poisoned");
        let total = history.len();
        let detections = history.iter().filter(|r| r.threat_detected).count();
        let avg_confidence = if total > 0 {
            history.iter().map(|r| r.confidence).sum::<f64>() / total as f64
        } else {
            0.0
        };
        ThreatDetectorStats {
            total_analyzed: total,
            threats_detected: detections,
            detection_rate: if total > 0 {
                detections as f64 / total as f64
            } else {
                0.0
            },
            avg_confidence,
        }
    }
}

/// Classification by consensus and averaged confidence. Zero or one votes
/// always classify BENIGN, as does a consensus whose confidence never
/// clears the SUSPICIOUS threshold.
fn classify(consensus: bool, confidence: f64) -> ThreatClassification {
    let cfg = &crate::config::get().detection;
    if !consensus {
        return ThreatClassification::Benign;
    }
    if confidence > cfg.catastrophic_threshold {
        ThreatClassification::Catastrophic
    } else if confidence > cfg.critical_threshold {
        ThreatClassification::Critical
    } else if confidence > cfg.malicious_threshold {
        ThreatClassification::Malicious
    } else if confidence > cfg.suspicious_threshold {
        ThreatClassification::Suspicious
    } else {
        ThreatClassification::Benign
    }
}

/// Primary threat type from traffic patterns.
fn determine_threat_type(traffic: &[TrafficEvent]) -> String {
    if traffic.is_empty() {
        return "unknown".to_string();
    }
    let unique_ports: HashSet<u16> = traffic.iter().map(|e| e.port).collect();
    if unique_ports.len() > 10 {
        return "port_scan".to_string();
    }
    if traffic.iter().any(|e| e.port == 22 || e.port == 3_389) {
        return "ssh_brute_force".to_string();
    }
    if traffic.iter().any(|e| e.packet_size > 65_000) {
        return "dos_attack".to_string();
    }
    "anomalous_traffic".to_string()
}

fn recommendation_for(classification: ThreatClassification) -> String {
    match classification {
        ThreatClassification::Benign => "No action required",
        ThreatClassification::Suspicious => "Monitor closely, escalate if pattern continues",
        ThreatClassification::Malicious => "Block source immediately, log incident",
        ThreatClassification::Critical => "Block source, isolate affected systems, alert team",
        ThreatClassification::Catastrophic => "Execute emergency response plan immediately",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::BTreeMap;

    /// Fixed-vote detector for consensus tests.
    struct FixedModel {
        name: String,
        vote: DetectorVote,
    }

    impl DetectorModel for FixedModel {
        fn name(&self) -> &str {
            &self.name
        }

        fn detect(&self, _features: &[f64]) -> DetectorVote {
            self.vote.clone()
        }

        fn set_params(&self, _params: DetectorParams) {}
    }

    fn fixed(name: &str, is_threat: bool, confidence: f64) -> Arc<dyn DetectorModel> {
        Arc::new(FixedModel {
            name: name.to_string(),
            vote: DetectorVote {
                is_threat,
                confidence,
            },
        })
    }

    fn traffic(port: u16, size: u32, offset: i64) -> TrafficEvent {
        TrafficEvent {
            timestamp: Utc::now() + Duration::seconds(offset),
            source_ip: "203.0.113.9".to_string(),
            destination_ip: "10.0.0.2".to_string(),
            port,
            protocol: "tcp".to_string(),
            packet_size: size,
            flags: vec![],
            ttl: 64,
            window_size: 65_535,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn two_of_three_votes_reach_consensus() {
        let detector = ThreatDetector::new(vec![
            fixed("a", true, 0.9),
            fixed("b", true, 0.8),
            fixed("c", false, 0.2),
        ]);
        let events: Vec<TrafficEvent> = (0..20).map(|i| traffic(80, 512, i)).collect();
        let result = detector.detect(&events);

        assert!(result.threat_detected);
        assert!((result.confidence - 0.6333).abs() < 0.001);
        assert_eq!(result.classification, ThreatClassification::Suspicious);
        assert_eq!(result.contributing_models.len(), 3);
    }

    #[test]
    fn single_vote_stays_benign() {
        let detector = ThreatDetector::new(vec![
            fixed("a", true, 0.9),
            fixed("b", false, 0.1),
            fixed("c", false, 0.1),
        ]);
        let result = detector.detect(&[traffic(80, 512, 0)]);
        assert!(!result.threat_detected);
        assert_eq!(result.classification, ThreatClassification::Benign);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn classification_thresholds_are_exclusive_lower_bounds() {
        let cases = [
            (0.96, ThreatClassification::Catastrophic),
            (0.90, ThreatClassification::Critical),
            (0.75, ThreatClassification::Malicious),
            (0.60, ThreatClassification::Suspicious),
        ];
        for (confidence, expected) in cases {
            let detector = ThreatDetector::new(vec![
                fixed("a", true, confidence),
                fixed("b", true, confidence),
                fixed("c", true, confidence),
            ]);
            let result = detector.detect(&[traffic(80, 512, 0)]);
            assert_eq!(result.classification, expected, "confidence {confidence}");
        }
    }

    #[test]
    fn threat_type_inference_matches_traffic_shape() {
        // > 10 distinct destination ports
        let scan: Vec<TrafficEvent> = (0..12).map(|i| traffic(1_000 + i, 64, i as i64)).collect();
        assert_eq!(determine_threat_type(&scan), "port_scan");

        // SSH port present
        let ssh = vec![traffic(22, 128, 0)];
        assert_eq!(determine_threat_type(&ssh), "ssh_brute_force");

        // Oversized packet
        let dos = vec![traffic(80, 66_000, 0)];
        assert_eq!(determine_threat_type(&dos), "dos_attack");

        // Anything else
        let plain = vec![traffic(80, 512, 0)];
        assert_eq!(determine_threat_type(&plain), "anomalous_traffic");

        assert_eq!(determine_threat_type(&[]), "unknown");
    }

    #[test]
    fn detection_invariant_holds_across_inputs() {
        let detector = ThreatDetector::with_default_models();
        for i in 0..30 {
            let events: Vec<TrafficEvent> = (0..5).map(|j| traffic(80, 512 * (i + 1), j)).collect();
            let result = detector.detect(&events);
            assert_eq!(
                result.threat_detected,
                result.classification != ThreatClassification::Benign
            );
            assert!((0.0..=1.0).contains(&result.confidence));
            assert!((0.0..=100.0).contains(&result.score));
        }
    }
}
