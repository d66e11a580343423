//! Hyperparameter tuner — random search followed by local perturbation
//!
//! First phase samples the space uniformly for `K` trials; the second
//! phase runs `K/2` small perturbations around the best point found. The
//! caller supplies the scoring function (validation accuracy).

use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Instant;
use tracing::debug;

use crate::types::TuningResult;

/// Relative width of the perturbation phase.
const PERTURBATION_FRACTION: f64 = 0.1;

/// Random-then-directed hyperparameter search.
pub struct HyperparameterTuner {
    history: Mutex<Vec<TuningResult>>,
}

impl HyperparameterTuner {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(Vec::new()),
        }
    }

    /// Search the space for the best-scoring assignment.
    pub fn tune<F>(&self, space: &BTreeMap<String, Vec<f64>>, score: F) -> TuningResult
    where
        F: Fn(&BTreeMap<String, f64>) -> f64,
    {
        let random_trials = crate::config::get().learning.tuner_random_trials.max(1);
        let perturb_trials = random_trials / 2;
        let started = Instant::now();
        let mut rng = rand::thread_rng();

        let mut best_params = sample_random(space, &mut rng);
        let mut best_score = score(&best_params);

        // Phase 1: uniform random search.
        for _ in 1..random_trials {
            let params = sample_random(space, &mut rng);
            let trial = score(&params);
            if trial > best_score {
                best_score = trial;
                best_params = params;
            }
        }

        // Phase 2: small perturbations around the best point.
        let normal = Normal::new(0.0, PERTURBATION_FRACTION).expect("valid normal");
        for _ in 0..perturb_trials {
            let mut params = best_params.clone();
            for value in params.values_mut() {
                *value *= 1.0 + normal.sample(&mut rng);
            }
            let trial = score(&params);
            if trial > best_score {
                best_score = trial;
                best_params = params;
            }
        }

        let result = TuningResult {
            best_parameters: best_params,
            best_score,
            iterations_completed: random_trials + perturb_trials,
            time_elapsed_seconds: started.elapsed().as_secs_f64(),
            converged: true,
        };
        debug!(
            best_score = result.best_score,
            iterations = result.iterations_completed,
            "Hyperparameter search finished"
        );
        self.history
            .lock()
            .expect("tuning history lock poisoned")
            .push(result.clone());
        result
    }

    /// Completed tuning runs.
    pub fn runs(&self) -> usize {
        self.history.lock().expect("tuning history lock poisoned").len()
    }
}

impl Default for HyperparameterTuner {
    fn default() -> Self {
        Self::new()
    }
}

fn sample_random(
    space: &BTreeMap<String, Vec<f64>>,
    rng: &mut impl Rng,
) -> BTreeMap<String, f64> {
    space
        .iter()
        .map(|(name, values)| {
            let value = values.choose(rng).copied().unwrap_or(0.0);
            (name.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> BTreeMap<String, Vec<f64>> {
        [
            ("learning_rate".to_string(), vec![0.001, 0.01, 0.1]),
            ("batch_size".to_string(), vec![16.0, 32.0, 64.0]),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn search_finds_the_dominant_assignment() {
        let tuner = HyperparameterTuner::new();
        // Score peaks at the highest learning rate.
        let result = tuner.tune(&space(), |params| params["learning_rate"]);
        assert!(result.best_score >= 0.1 * 0.9);
        assert!(result.converged);
        assert_eq!(tuner.runs(), 1);
    }

    #[test]
    fn iteration_count_is_random_plus_half() {
        let tuner = HyperparameterTuner::new();
        let result = tuner.tune(&space(), |_| 0.5);
        let k = crate::config::get().learning.tuner_random_trials;
        assert_eq!(result.iterations_completed, k + k / 2);
    }

    #[test]
    fn parameters_cover_every_dimension() {
        let tuner = HyperparameterTuner::new();
        let result = tuner.tune(&space(), |_| 0.5);
        assert!(result.best_parameters.contains_key("learning_rate"));
        assert!(result.best_parameters.contains_key("batch_size"));
    }
}
