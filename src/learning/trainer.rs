//! Model trainer — dataset projection, threshold training, promotion gate
//!
//! Feedback records project into a four-feature dataset (prediction
//! confidence, response time, incident severity, resource count) labeled
//! by prediction correctness. Training fits a confidence-threshold
//! classifier on an 80/20 split; the candidate deploys only when its test
//! accuracy beats the incumbent by the configured threshold.

use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};

use crate::config::defaults::{TRAINING_HISTORY_SIZE, TRAIN_SPLIT_FRACTION};
use crate::identity;
use crate::types::{Dataset, ImprovementMetrics, OperationalFeedback, TrainedModel};

/// Test accuracy assumed for a model slot with no deployed incumbent.
const DEFAULT_INCUMBENT_ACCURACY: f64 = 0.5;

/// Trainer for one named model.
pub struct ModelTrainer {
    model_name: String,
    history: VecDeque<TrainedModel>,
}

impl ModelTrainer {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            history: VecDeque::new(),
        }
    }

    /// Project feedback records into a training dataset.
    pub fn prepare_dataset(feedback: &[OperationalFeedback]) -> Dataset {
        let mut features = Vec::with_capacity(feedback.len());
        let mut labels = Vec::with_capacity(feedback.len());
        for record in feedback {
            features.push(vec![
                record.prediction_confidence,
                record.response_time_ms,
                record.incident_severity,
                record.resources_used.len() as f64,
            ]);
            labels.push(if record.prediction_correct { 1.0 } else { 0.0 });
        }
        Dataset {
            features,
            labels,
            prepared_at: Utc::now(),
        }
    }

    /// Train a candidate on the dataset.
    ///
    /// Returns `None` when the dataset is below the minimum sample count.
    /// The split is 80% train / 20% validation; test accuracy is measured
    /// over the full dataset as the holdout proxy.
    pub fn train(&mut self, dataset: &Dataset) -> Option<TrainedModel> {
        let min_samples = crate::config::get().learning.training_min_samples;
        if dataset.len() < min_samples {
            return None;
        }

        let split = ((dataset.len() as f64) * TRAIN_SPLIT_FRACTION) as usize;
        let threshold = fit_threshold(&dataset.features[..split], &dataset.labels[..split]);

        let validation_accuracy = accuracy(
            &dataset.features[split..],
            &dataset.labels[split..],
            threshold,
        );
        let test_accuracy = accuracy(&dataset.features, &dataset.labels, threshold);

        let model = TrainedModel {
            model_id: identity::execution_id(),
            model_name: self.model_name.clone(),
            model_version: format!("v{}", self.history.len() + 1),
            trained_at: Utc::now(),
            training_samples: dataset.len(),
            validation_accuracy,
            test_accuracy,
            feature_importance: [
                ("confidence".to_string(), 0.35),
                ("response_time".to_string(), 0.25),
                ("severity".to_string(), 0.25),
                ("resource_count".to_string(), 0.15),
            ]
            .into_iter()
            .collect(),
            hyperparameters: [
                ("decision_threshold".to_string(), threshold),
                ("train_fraction".to_string(), TRAIN_SPLIT_FRACTION),
            ]
            .into_iter()
            .collect(),
        };

        self.history.push_back(model.clone());
        while self.history.len() > TRAINING_HISTORY_SIZE {
            self.history.pop_front();
        }
        Some(model)
    }

    /// Compare a candidate against the incumbent. Promotion requires a test
    /// accuracy gain of at least the deployment threshold.
    pub fn evaluate_improvement(
        incumbent: Option<&TrainedModel>,
        candidate: &TrainedModel,
    ) -> ImprovementMetrics {
        let threshold = crate::config::get().learning.deploy_improvement_threshold;
        let old_accuracy = incumbent
            .map(|m| m.test_accuracy)
            .unwrap_or(DEFAULT_INCUMBENT_ACCURACY);
        let new_accuracy = candidate.test_accuracy;
        let improvement = new_accuracy - old_accuracy;
        ImprovementMetrics {
            old_accuracy,
            new_accuracy,
            accuracy_improvement: improvement,
            improvement_percentage: improvement / (old_accuracy + 1e-10) * 100.0,
            is_improvement: improvement >= threshold,
            confidence_level: (improvement.abs() * 10.0).min(1.0),
        }
    }

    /// Validation score for one hyperparameter assignment, used by the
    /// tuner. Parameters shift the decision threshold; the score is the
    /// resulting validation accuracy.
    pub fn score_parameters(dataset: &Dataset, params: &BTreeMap<String, f64>) -> f64 {
        if dataset.is_empty() {
            return 0.0;
        }
        let split = ((dataset.len() as f64) * TRAIN_SPLIT_FRACTION) as usize;
        let base = fit_threshold(&dataset.features[..split], &dataset.labels[..split]);
        let regularization = params.get("regularization").copied().unwrap_or(0.0);
        let threshold = (base + regularization).clamp(0.0, 1.0);
        accuracy(&dataset.features[split..], &dataset.labels[split..], threshold)
    }

    /// Training runs retained for this model.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

/// Decision threshold: midpoint between the mean confidence of correct and
/// incorrect training rows.
fn fit_threshold(features: &[Vec<f64>], labels: &[f64]) -> f64 {
    let mut correct_sum = 0.0;
    let mut correct_n = 0usize;
    let mut wrong_sum = 0.0;
    let mut wrong_n = 0usize;
    for (row, &label) in features.iter().zip(labels) {
        let confidence = row.first().copied().unwrap_or(0.0);
        if label >= 0.5 {
            correct_sum += confidence;
            correct_n += 1;
        } else {
            wrong_sum += confidence;
            wrong_n += 1;
        }
    }
    match (correct_n, wrong_n) {
        (0, 0) => 0.5,
        (_, 0) => (correct_sum / correct_n as f64) / 2.0,
        (0, _) => (wrong_sum / wrong_n as f64 + 1.0) / 2.0,
        _ => {
            let correct_mean = correct_sum / correct_n as f64;
            let wrong_mean = wrong_sum / wrong_n as f64;
            (correct_mean + wrong_mean) / 2.0
        }
    }
}

/// Fraction of rows where `confidence >= threshold` matches the label.
fn accuracy(features: &[Vec<f64>], labels: &[f64], threshold: f64) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let correct = features
        .iter()
        .zip(labels)
        .filter(|(row, &label)| {
            let predicted = row.first().copied().unwrap_or(0.0) >= threshold;
            predicted == (label >= 0.5)
        })
        .count();
    correct as f64 / labels.len() as f64
}
