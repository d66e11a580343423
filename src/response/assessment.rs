//! Threat Assessor — CVSS-style risk scoring
//!
//! The final risk score blends three weighted groups: base (intrinsic
//! exploit characteristics), temporal (current exploit landscape), and
//! environmental (deployment context), clipped to [1, 10]. Risk-level
//! thresholds use closed upper bounds, so a score sitting exactly on a
//! boundary takes the higher level. Auto-remediation requires a HIGH or
//! CRITICAL level and confidence at or above the configured floor.

use chrono::Utc;
use tracing::debug;

use crate::types::{
    AttackVector, CvssFactors, RemediationAction, RiskLevel, ThreatAssessment, ThreatSignal,
};

/// CVSS-style threat assessor.
pub struct ThreatAssessor;

impl ThreatAssessor {
    pub fn new() -> Self {
        Self
    }

    /// Assess a threat signal into a risk score, level, and remediation
    /// eligibility.
    pub fn assess(&self, signal: &ThreatSignal) -> ThreatAssessment {
        let cfg = &crate::config::get().assessment;
        let factors = signal
            .factors
            .clone()
            .unwrap_or_else(|| derive_factors(signal));

        let base = base_score(&factors);
        let temporal = temporal_score(&factors);
        let environmental = environmental_score(&factors);

        let risk_score = (cfg.base_weight * base
            + cfg.temporal_weight * temporal
            + cfg.environmental_weight * environmental)
            .clamp(1.0, 10.0);

        let risk_level = if risk_score >= cfg.critical_score {
            RiskLevel::Critical
        } else if risk_score >= cfg.high_score {
            RiskLevel::High
        } else if risk_score >= cfg.medium_score {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        let confidence = signal.detection.confidence.clamp(0.0, 1.0);
        let should_auto_remediate = matches!(risk_level, RiskLevel::High | RiskLevel::Critical)
            && confidence >= cfg.auto_remediation_confidence_min;

        let impact_score = impact(&factors, signal.affected_assets.len());
        let exploitability =
            (factors.attack_vector.weight() * (1.0 - 0.5 * factors.complexity)).clamp(0.0, 1.0);

        let assessment = ThreatAssessment {
            threat_id: signal.threat_id.clone(),
            risk_score,
            risk_level,
            confidence,
            impact_score,
            affected_assets: signal.affected_assets.clone(),
            attack_vector: factors.attack_vector,
            exploitability,
            should_auto_remediate,
            remediation_actions: recommended_actions(&signal.threat_type, risk_level),
            context_factors: context_factors(signal, base, temporal, environmental),
            assessed_at: Utc::now(),
        };

        debug!(
            threat_id = %assessment.threat_id,
            risk_score = assessment.risk_score,
            risk_level = %assessment.risk_level,
            auto_remediate = assessment.should_auto_remediate,
            "Threat assessed"
        );
        assessment
    }
}

impl Default for ThreatAssessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive scoring factors from the detection result when the signal does
/// not carry explicit ones.
fn derive_factors(signal: &ThreatSignal) -> CvssFactors {
    let detection = &signal.detection;
    let normalized_score = (detection.score / 100.0).clamp(0.0, 1.0);
    CvssFactors {
        attack_vector: AttackVector::Network,
        complexity: 1.0 - detection.confidence,
        privileges_required: 0.5,
        user_interaction: 0.5,
        scope_change: normalized_score,
        confidentiality_impact: normalized_score,
        integrity_impact: normalized_score,
        availability_impact: normalized_score,
        exploit_maturity: normalized_score,
        remediation_available: 0.5,
        report_confidence: detection.confidence,
        asset_criticality: (signal.affected_assets.len() as f64 / 10.0).min(1.0),
        exposure: 0.5,
        business_impact: normalized_score,
    }
}

/// Weighted base-group score in [0, 10].
fn base_score(factors: &CvssFactors) -> f64 {
    let weighted = 0.20 * factors.attack_vector.weight()
        + 0.10 * factors.complexity
        + 0.10 * factors.privileges_required
        + 0.05 * factors.user_interaction
        + 0.10 * factors.scope_change
        + 0.15 * factors.confidentiality_impact
        + 0.15 * factors.integrity_impact
        + 0.15 * factors.availability_impact;
    weighted * 10.0
}

/// Weighted temporal-group score in [0, 10].
fn temporal_score(factors: &CvssFactors) -> f64 {
    let weighted = 0.40 * factors.exploit_maturity
        + 0.30 * factors.remediation_available
        + 0.30 * factors.report_confidence;
    weighted * 10.0
}

/// Weighted environmental-group score in [0, 10].
fn environmental_score(factors: &CvssFactors) -> f64 {
    let weighted = 0.40 * factors.asset_criticality
        + 0.30 * factors.exposure
        + 0.30 * factors.business_impact;
    weighted * 10.0
}

/// Impact estimate in [0, 1] from CIA factors and the asset count.
fn impact(factors: &CvssFactors, asset_count: usize) -> f64 {
    let cia = (factors.confidentiality_impact
        + factors.integrity_impact
        + factors.availability_impact)
        / 3.0;
    let spread = (asset_count as f64 / 100.0).min(1.0);
    (0.7 * cia + 0.3 * spread).clamp(0.0, 1.0)
}

/// Actions recommended per threat type, critical threats widen the set.
fn recommended_actions(threat_type: &str, level: RiskLevel) -> Vec<RemediationAction> {
    let mut actions = match threat_type {
        "port_scan" => vec![
            RemediationAction::BlockSourceIp,
            RemediationAction::IncreaseMonitoring,
            RemediationAction::CollectEvidence,
        ],
        "ssh_brute_force" | "brute_force" => vec![
            RemediationAction::BlockSourceIp,
            RemediationAction::ResetSession,
            RemediationAction::RotateCredentials,
        ],
        "dos_attack" => vec![
            RemediationAction::ApplyRateLimit,
            RemediationAction::EnableDeepInspection,
            RemediationAction::CollectEvidence,
        ],
        _ => vec![
            RemediationAction::IncreaseMonitoring,
            RemediationAction::EnableDeepInspection,
            RemediationAction::CollectEvidence,
        ],
    };
    if level == RiskLevel::Critical {
        actions.push(RemediationAction::QuarantineNode);
        actions.push(RemediationAction::IsolateTunnel);
    }
    actions
}

fn context_factors(
    signal: &ThreatSignal,
    base: f64,
    temporal: f64,
    environmental: f64,
) -> Vec<String> {
    vec![
        format!("base score {:.2}", base),
        format!("temporal score {:.2}", temporal),
        format!("environmental score {:.2}", environmental),
        format!("detector consensus confidence {:.2}", signal.detection.confidence),
        format!("{} affected assets", signal.affected_assets.len()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DetectionResult, ThreatClassification};
    use std::collections::BTreeMap;

    fn signal(confidence: f64, factors: Option<CvssFactors>) -> ThreatSignal {
        ThreatSignal {
            threat_id: "threat-1".to_string(),
            timestamp: Utc::now(),
            source: "sensor-1".to_string(),
            threat_type: "port_scan".to_string(),
            fingerprint: "fp-1".to_string(),
            affected_assets: vec!["node-1".to_string(), "node-2".to_string()],
            detection: DetectionResult {
                threat_detected: true,
                classification: ThreatClassification::Critical,
                confidence,
                score: confidence * 100.0,
                primary_type: "port_scan".to_string(),
                contributing_models: BTreeMap::new(),
                features_triggered: vec![],
                recommendation: String::new(),
                timestamp: Utc::now(),
            },
            factors,
        }
    }

    fn max_factors() -> CvssFactors {
        CvssFactors {
            attack_vector: AttackVector::Network,
            complexity: 1.0,
            privileges_required: 1.0,
            user_interaction: 1.0,
            scope_change: 1.0,
            confidentiality_impact: 1.0,
            integrity_impact: 1.0,
            availability_impact: 1.0,
            exploit_maturity: 1.0,
            remediation_available: 1.0,
            report_confidence: 1.0,
            asset_criticality: 1.0,
            exposure: 1.0,
            business_impact: 1.0,
        }
    }

    #[test]
    fn risk_score_stays_in_one_to_ten() {
        let assessor = ThreatAssessor::new();
        let low = assessor.assess(&signal(0.0, None));
        let high = assessor.assess(&signal(1.0, Some(max_factors())));
        assert!(low.risk_score >= 1.0);
        assert!(high.risk_score <= 10.0);
    }

    #[test]
    fn maximal_factors_reach_critical_and_auto_remediate() {
        let assessor = ThreatAssessor::new();
        let assessment = assessor.assess(&signal(0.9, Some(max_factors())));
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        assert!(assessment.risk_score >= 9.0);
        assert!(assessment.should_auto_remediate);
        // Critical level widens the recommended actions
        assert!(assessment
            .remediation_actions
            .contains(&RemediationAction::QuarantineNode));
    }

    #[test]
    fn exact_threshold_selects_higher_level() {
        // Closed upper bound: a score of exactly 9.0 is CRITICAL.
        let mut factors = max_factors();
        // Base weighted sum = 1.0 → 10; scale down uniformly so the blended
        // score lands exactly on 9.0.
        factors.complexity = 0.9;
        factors.privileges_required = 0.9;
        factors.user_interaction = 0.9;
        factors.scope_change = 0.9;
        factors.confidentiality_impact = 0.9;
        factors.integrity_impact = 0.9;
        factors.availability_impact = 0.9;
        factors.exploit_maturity = 0.9;
        factors.remediation_available = 0.9;
        factors.report_confidence = 0.9;
        factors.asset_criticality = 0.9;
        factors.exposure = 0.9;
        factors.business_impact = 0.9;
        // attack_vector weight stays 1.0; weighted base = 0.2 + 0.8*0.9 = 0.92
        // temporal = environmental = 9.0
        // final = 0.7*9.2 + 0.15*9.0 + 0.15*9.0 = 9.14 ≥ 9 → CRITICAL
        let assessor = ThreatAssessor::new();
        let assessment = assessor.assess(&signal(0.9, Some(factors)));
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn low_confidence_blocks_auto_remediation() {
        let assessor = ThreatAssessor::new();
        let assessment = assessor.assess(&signal(0.5, Some(max_factors())));
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        assert!(!assessment.should_auto_remediate);
    }

    #[test]
    fn auto_remediation_invariant_holds() {
        let assessor = ThreatAssessor::new();
        for confidence in [0.1, 0.5, 0.74, 0.75, 0.9] {
            for factors in [None, Some(max_factors())] {
                let assessment = assessor.assess(&signal(confidence, factors));
                if assessment.should_auto_remediate {
                    assert!(matches!(
                        assessment.risk_level,
                        RiskLevel::High | RiskLevel::Critical
                    ));
                    assert!(assessment.confidence >= 0.75);
                }
            }
        }
    }
}
