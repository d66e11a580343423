//! Continuous-learning types: operator feedback records, projected training
//! datasets, trained-model metadata, and improvement/tuning results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Operator-labeled outcome of a prior prediction, used to retrain models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationalFeedback {
    pub timestamp: DateTime<Utc>,
    pub incident_type: String,
    /// Which model made the prediction
    pub detection_model: String,
    pub prediction_correct: bool,
    pub prediction_confidence: f64,
    /// Incident severity in [0, 1]
    pub incident_severity: f64,
    pub response_time_ms: f64,
    pub resources_used: BTreeMap<String, f64>,
    /// Whether the overall response succeeded
    pub success: bool,
    #[serde(default)]
    pub notes: String,
}

/// Training dataset projected from the feedback buffer.
///
/// Rows of `features` and `labels` correspond one-to-one.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
    pub prepared_at: DateTime<Utc>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Versioned metadata for a trained model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub model_id: String,
    pub model_name: String,
    pub model_version: String,
    pub trained_at: DateTime<Utc>,
    pub training_samples: usize,
    pub validation_accuracy: f64,
    pub test_accuracy: f64,
    pub feature_importance: BTreeMap<String, f64>,
    pub hyperparameters: BTreeMap<String, f64>,
}

/// Comparison between an incumbent model and a freshly trained candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementMetrics {
    pub old_accuracy: f64,
    pub new_accuracy: f64,
    pub accuracy_improvement: f64,
    pub improvement_percentage: f64,
    /// True iff the gain meets the deployment threshold
    pub is_improvement: bool,
    pub confidence_level: f64,
}

/// Hyperparameter search outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningResult {
    pub best_parameters: BTreeMap<String, f64>,
    pub best_score: f64,
    pub iterations_completed: usize,
    pub time_elapsed_seconds: f64,
    pub converged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dataset_reports_zero_len() {
        let dataset = Dataset {
            features: Vec::new(),
            labels: Vec::new(),
            prepared_at: Utc::now(),
        };
        assert!(dataset.is_empty());
        assert_eq!(dataset.len(), 0);
    }
}
