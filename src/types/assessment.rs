//! Threat assessment types: the signal handed to the workflow by the
//! detection stage, CVSS-style scoring factors, and the resulting risk
//! assessment that gates alerting and auto-remediation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::detection::DetectionResult;
use super::response::RemediationAction;

/// Risk levels derived from the final risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Attack vector dimension of the base score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttackVector {
    Network,
    Adjacent,
    Local,
    Physical,
}

impl AttackVector {
    /// Base-score contribution of the vector; remote reach scores highest.
    pub fn weight(&self) -> f64 {
        match self {
            AttackVector::Network => 1.0,
            AttackVector::Adjacent => 0.65,
            AttackVector::Local => 0.4,
            AttackVector::Physical => 0.2,
        }
    }
}

/// CVSS-style scoring factors, each in [0, 1].
///
/// Grouped as base (intrinsic exploit characteristics), temporal (current
/// exploit landscape), and environmental (deployment context). Factors left
/// at default are derived from the detection confidence by the assessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvssFactors {
    // Base
    pub attack_vector: AttackVector,
    pub complexity: f64,
    pub privileges_required: f64,
    pub user_interaction: f64,
    pub scope_change: f64,
    pub confidentiality_impact: f64,
    pub integrity_impact: f64,
    pub availability_impact: f64,
    // Temporal
    pub exploit_maturity: f64,
    pub remediation_available: f64,
    pub report_confidence: f64,
    // Environmental
    pub asset_criticality: f64,
    pub exposure: f64,
    pub business_impact: f64,
}

impl Default for CvssFactors {
    fn default() -> Self {
        Self {
            attack_vector: AttackVector::Network,
            complexity: 0.5,
            privileges_required: 0.5,
            user_interaction: 0.5,
            scope_change: 0.5,
            confidentiality_impact: 0.5,
            integrity_impact: 0.5,
            availability_impact: 0.5,
            exploit_maturity: 0.5,
            remediation_available: 0.5,
            report_confidence: 0.5,
            asset_criticality: 0.5,
            exposure: 0.5,
            business_impact: 0.5,
        }
    }
}

/// Threat signal handed from the detection stage to the response workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatSignal {
    /// Stable threat identifier (fingerprint or generated id)
    pub threat_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub threat_type: String,
    /// Fingerprint of the originating event, for suppression
    pub fingerprint: String,
    pub affected_assets: Vec<String>,
    pub detection: DetectionResult,
    /// Explicit scoring factors; derived from the detection when absent
    pub factors: Option<CvssFactors>,
}

/// Result of CVSS-style risk assessment.
///
/// Invariant: `should_auto_remediate` implies `risk_level` is HIGH or
/// CRITICAL and `confidence ≥ auto_remediation_confidence_min`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatAssessment {
    pub threat_id: String,
    /// Final risk score in [1.0, 10.0]
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    /// Assessment confidence in [0, 1]
    pub confidence: f64,
    /// Normalized impact estimate in [0, 1]
    pub impact_score: f64,
    pub affected_assets: Vec<String>,
    pub attack_vector: AttackVector,
    /// Exploitability estimate in [0, 1]
    pub exploitability: f64,
    pub should_auto_remediate: bool,
    /// Recommended actions, highest priority first
    pub remediation_actions: Vec<RemediationAction>,
    /// Human-readable factors that drove the score
    pub context_factors: Vec<String>,
    pub assessed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attack_vector_weights_descend_with_required_proximity() {
        assert!(AttackVector::Network.weight() > AttackVector::Adjacent.weight());
        assert!(AttackVector::Adjacent.weight() > AttackVector::Local.weight());
        assert!(AttackVector::Local.weight() > AttackVector::Physical.weight());
    }
}
