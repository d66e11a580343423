//! Continuous learning — feedback-driven retraining and model promotion
//!
//! Operational feedback accumulates in a bounded buffer. Retraining fires
//! on a per-model schedule or once the buffer has grown enough since the
//! last run. Each run projects the buffer into a dataset, trains a
//! candidate, and promotes it only when its test accuracy beats the
//! incumbent by the deployment threshold. Only this orchestrator swaps the
//! active-model pointer; detectors read the active snapshot per call.

mod feedback;
mod trainer;
mod tuner;

pub use feedback::{FeedbackBuffer, FeedbackStats};
pub use trainer::ModelTrainer;
pub use tuner::HyperparameterTuner;

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::types::{OperationalFeedback, TrainedModel, TuningResult};

/// Learning status snapshot for one model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub name: String,
    pub deployed: bool,
    pub active_version: Option<String>,
    pub active_test_accuracy: Option<f64>,
    pub last_retrain: Option<DateTime<Utc>>,
}

/// Continuous-learning orchestrator over a set of named models.
pub struct LearningFramework {
    model_names: Vec<String>,
    feedback: FeedbackBuffer,
    trainers: HashMap<String, Mutex<ModelTrainer>>,
    tuner: HyperparameterTuner,
    /// Active (deployed) models; swapped atomically on promotion
    active: ArcSwap<HashMap<String, TrainedModel>>,
    last_retrain: Mutex<HashMap<String, DateTime<Utc>>>,
    buffer_len_at_last_train: Mutex<usize>,
}

impl LearningFramework {
    pub fn new(model_names: Vec<String>) -> Self {
        let trainers = model_names
            .iter()
            .map(|name| (name.clone(), Mutex::new(ModelTrainer::new(name))))
            .collect();
        Self {
            model_names,
            feedback: FeedbackBuffer::from_config(),
            trainers,
            tuner: HyperparameterTuner::new(),
            active: ArcSwap::from_pointee(HashMap::new()),
            last_retrain: Mutex::new(HashMap::new()),
            buffer_len_at_last_train: Mutex::new(0),
        }
    }

    /// Record operational feedback; triggers retraining when due.
    pub async fn process_feedback(&self, feedback: OperationalFeedback) {
        let model = feedback.detection_model.clone();
        self.feedback.push(feedback);
        if self.should_retrain(&model) {
            self.retrain_models().await;
        }
    }

    /// Whether a model's retraining is due: schedule elapsed, or the buffer
    /// grew past the growth threshold since the last run.
    fn should_retrain(&self, model_name: &str) -> bool {
        let cfg = &crate::config::get().learning;
        let growth = {
            let at_last = *self
                .buffer_len_at_last_train
                .lock()
                .expect("train marker lock poisoned");
            self.feedback.total_received().saturating_sub(at_last)
        };
        if growth >= cfg.retrain_growth_threshold {
            return true;
        }
        let last = self
            .last_retrain
            .lock()
            .expect("retrain times lock poisoned")
            .get(model_name)
            .copied();
        match last {
            None => self.feedback.len() >= cfg.training_min_samples,
            Some(at) => Utc::now() - at >= Duration::hours(cfg.training_schedule_hours as i64),
        }
    }

    /// Retrain every model from the current buffer, promoting improvements.
    pub async fn retrain_models(&self) -> Vec<TrainedModel> {
        let cfg = &crate::config::get().learning;
        let snapshot = self.feedback.snapshot();
        *self
            .buffer_len_at_last_train
            .lock()
            .expect("train marker lock poisoned") = self.feedback.total_received();

        let mut promoted = Vec::new();
        for model_name in &self.model_names {
            let trainer = &self.trainers[model_name];
            let dataset = ModelTrainer::prepare_dataset(&snapshot);
            if dataset.len() < cfg.training_min_samples {
                debug!(
                    model = %model_name,
                    samples = dataset.len(),
                    "Skipping retrain — insufficient samples"
                );
                continue;
            }

            let candidate = {
                let mut trainer = trainer.lock().expect("trainer lock poisoned");
                match trainer.train(&dataset) {
                    Some(model) => model,
                    None => continue,
                }
            };

            let active = self.active.load();
            let incumbent = active.get(model_name);
            let improvement = ModelTrainer::evaluate_improvement(incumbent, &candidate);

            self.last_retrain
                .lock()
                .expect("retrain times lock poisoned")
                .insert(model_name.clone(), Utc::now());

            if improvement.is_improvement {
                info!(
                    model = %model_name,
                    version = %candidate.model_version,
                    old_accuracy = improvement.old_accuracy,
                    new_accuracy = improvement.new_accuracy,
                    "Model promoted"
                );
                let mut next: HashMap<String, TrainedModel> = (**active).clone();
                next.insert(model_name.clone(), candidate.clone());
                self.active.store(Arc::new(next));
                promoted.push(candidate);
            } else {
                info!(
                    model = %model_name,
                    old_accuracy = improvement.old_accuracy,
                    new_accuracy = improvement.new_accuracy,
                    "Candidate not promoted"
                );
            }
        }
        promoted
    }

    /// Hyperparameter optimization across all models (on-demand phase).
    pub async fn optimize_hyperparameters(&self) -> BTreeMap<String, TuningResult> {
        let cfg = &crate::config::get().learning;
        let snapshot = self.feedback.snapshot();
        let dataset = ModelTrainer::prepare_dataset(&snapshot);
        let mut results = BTreeMap::new();
        if dataset.len() < cfg.training_min_samples {
            return results;
        }

        let space: BTreeMap<String, Vec<f64>> = [
            (
                "learning_rate".to_string(),
                vec![0.0001, 0.0005, 0.001, 0.005, 0.01],
            ),
            ("batch_size".to_string(), vec![16.0, 32.0, 64.0, 128.0]),
            (
                "regularization".to_string(),
                vec![0.0, 0.0001, 0.0005, 0.001],
            ),
        ]
        .into_iter()
        .collect();

        for model_name in &self.model_names {
            let result = self.tuner.tune(&space, |params| {
                ModelTrainer::score_parameters(&dataset, params)
            });
            info!(
                model = %model_name,
                best_score = result.best_score,
                iterations = result.iterations_completed,
                "Hyperparameters optimized"
            );
            results.insert(model_name.clone(), result);
        }
        results
    }

    /// Active model for a name, when one has been deployed.
    pub fn active_model(&self, model_name: &str) -> Option<TrainedModel> {
        self.active.load().get(model_name).cloned()
    }

    /// Status of every managed model.
    pub fn status(&self) -> Vec<ModelStatus> {
        let active = self.active.load();
        let last = self.last_retrain.lock().expect("retrain times lock poisoned");
        self.model_names
            .iter()
            .map(|name| {
                let model = active.get(name);
                ModelStatus {
                    name: name.clone(),
                    deployed: model.is_some(),
                    active_version: model.map(|m| m.model_version.clone()),
                    active_test_accuracy: model.map(|m| m.test_accuracy),
                    last_retrain: last.get(name).copied(),
                }
            })
            .collect()
    }

    pub fn feedback_stats(&self) -> FeedbackStats {
        self.feedback.stats()
    }

    /// Periodic retraining sweep with jitter. Run from `tokio::spawn`.
    pub async fn run_schedule_loop(self: Arc<Self>, cancel: CancellationToken) {
        let hours = crate::config::get().learning.training_schedule_hours.max(1);
        let base = std::time::Duration::from_secs(hours * 3_600);
        info!(interval_hours = hours, "Retraining schedule started");
        loop {
            // ±10% jitter so co-deployed nodes never retrain in lockstep.
            let jitter = {
                let mut rng = rand::thread_rng();
                rng.gen_range(0.9..1.1)
            };
            let sleep = base.mul_f64(jitter);
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Retraining schedule stopped");
                    return;
                }
                _ = tokio::time::sleep(sleep) => {
                    let promoted = self.retrain_models().await;
                    debug!(promoted = promoted.len(), "Scheduled retrain complete");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feedback(correct: bool, confidence: f64) -> OperationalFeedback {
        OperationalFeedback {
            timestamp: Utc::now(),
            incident_type: "port_scan".to_string(),
            detection_model: "isolation_score".to_string(),
            prediction_correct: correct,
            prediction_confidence: confidence,
            incident_severity: 0.6,
            response_time_ms: 120.0,
            resources_used: BTreeMap::new(),
            success: correct,
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn first_deploy_requires_clearing_the_default_incumbent() {
        let framework = LearningFramework::new(vec!["isolation_score".to_string()]);
        // Cleanly separable feedback: high confidence is correct.
        for i in 0..200 {
            let correct = i % 4 != 0;
            let confidence = if correct { 0.9 } else { 0.2 };
            framework.feedback.push(feedback(correct, confidence));
        }
        let promoted = framework.retrain_models().await;
        // The separable dataset trains an accurate candidate, which beats
        // the 0.5 default incumbent accuracy by far more than 0.02.
        assert_eq!(promoted.len(), 1);
        assert!(framework.active_model("isolation_score").is_some());
    }

    #[tokio::test]
    async fn non_improving_candidate_is_not_promoted() {
        let framework = LearningFramework::new(vec!["isolation_score".to_string()]);
        for i in 0..100 {
            let correct = i % 4 != 0;
            framework
                .feedback
                .push(feedback(correct, if correct { 0.9 } else { 0.2 }));
        }
        framework.retrain_models().await;
        let first = framework.active_model("isolation_score").unwrap();

        // Same distribution again: the new candidate matches but does not
        // beat the incumbent by the deployment threshold.
        for i in 0..100 {
            let correct = i % 4 != 0;
            framework
                .feedback
                .push(feedback(correct, if correct { 0.9 } else { 0.2 }));
        }
        framework.retrain_models().await;
        let second = framework.active_model("isolation_score").unwrap();
        assert_eq!(first.model_id, second.model_id);
    }

    #[tokio::test]
    async fn small_buffers_skip_training() {
        let framework = LearningFramework::new(vec!["isolation_score".to_string()]);
        for _ in 0..5 {
            framework.feedback.push(feedback(true, 0.9));
        }
        let promoted = framework.retrain_models().await;
        assert!(promoted.is_empty());
        assert!(framework.active_model("isolation_score").is_none());
    }

    #[tokio::test]
    async fn tuning_reports_converged_results_per_model() {
        let framework = LearningFramework::new(vec!["isolation_score".to_string()]);
        for i in 0..50 {
            let correct = i % 3 != 0;
            framework
                .feedback
                .push(feedback(correct, if correct { 0.85 } else { 0.3 }));
        }
        let results = framework.optimize_hyperparameters().await;
        let result = &results["isolation_score"];
        assert!(result.converged);
        assert!(result.iterations_completed > 0);
        assert!(result.best_score >= 0.0 && result.best_score <= 1.0);
        assert!(result.best_parameters.contains_key("learning_rate"));
    }
}
