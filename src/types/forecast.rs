//! Forecasting types: recorded threat events and the near-future threat
//! probability forecast with its critical time windows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Recorded threat event used as forecasting history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatHistoryEvent {
    pub timestamp: DateTime<Utc>,
    pub threat_type: String,
    /// Severity in [0, 1]
    pub severity: f64,
    pub duration_minutes: f64,
    pub response_time_ms: f64,
    pub success: bool,
}

/// Preparedness tier recommended for a critical window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreparednessLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl PreparednessLevel {
    /// Tier for a given window threat probability.
    pub fn for_probability(probability: f64) -> Self {
        if probability > 0.8 {
            PreparednessLevel::Critical
        } else if probability > 0.6 {
            PreparednessLevel::High
        } else if probability > 0.4 {
            PreparednessLevel::Medium
        } else {
            PreparednessLevel::Low
        }
    }
}

/// High-risk time period identified within a forecast horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub threat_probability: f64,
    pub preparedness: PreparednessLevel,
}

/// Forecast of threat likelihood over a horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatForecast {
    pub forecast_start: DateTime<Utc>,
    pub forecast_end: DateTime<Utc>,
    /// Probability in [0, 1]
    pub threat_probability: f64,
    /// Most frequent threat type in the history
    pub expected_threat_type: String,
    pub expected_severity: f64,
    /// Confidence tier driven by history size
    pub confidence: f64,
    pub critical_windows: Vec<CriticalWindow>,
    /// Resource estimates scaled by the forecast probability
    pub resource_requirements: BTreeMap<String, f64>,
    pub recommended_actions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preparedness_tiers_cover_probability_range() {
        assert_eq!(
            PreparednessLevel::for_probability(0.9),
            PreparednessLevel::Critical
        );
        assert_eq!(
            PreparednessLevel::for_probability(0.7),
            PreparednessLevel::High
        );
        assert_eq!(
            PreparednessLevel::for_probability(0.5),
            PreparednessLevel::Medium
        );
        assert_eq!(
            PreparednessLevel::for_probability(0.1),
            PreparednessLevel::Low
        );
    }
}
