//! Anomaly Detector — baseline statistics with z-score and rate-of-change tests
//!
//! Per metric, a rolling baseline `{mean, stddev, q1, median, q3, min, max}`
//! is recomputed after every `B` additions. A new point raises a STATISTICAL
//! anomaly when its z-score against the baseline exceeds the threshold, and
//! a TEMPORAL anomaly when its delta versus the previous point deviates from
//! the recent delta distribution. BEHAVIORAL anomalies are flagged by
//! higher-layer callers. Detection is a single pass over a length-10 window.

use chrono::{DateTime, Utc};
use serde::Serialize;
use statrs::statistics::{Data, Distribution, Max, Min, OrderStatistics};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::debug;

use crate::config::defaults::{MIN_STD_FLOOR, TEMPORAL_TEST_WINDOW};
use crate::types::{Anomaly, AnomalyContext, AnomalyKind, TimeSeriesPoint};

/// Baseline statistics for one metric.
#[derive(Debug, Clone, Serialize)]
pub struct Baseline {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub updated_at: DateTime<Utc>,
    pub sample_count: usize,
}

/// Per-metric detection state.
#[derive(Debug, Default)]
struct MetricState {
    history: VecDeque<f64>,
    baseline: Option<Baseline>,
    adds_since_recompute: usize,
}

/// Multi-method metric anomaly detector.
pub struct AnomalyDetector {
    baseline_window: usize,
    z_threshold: f64,
    temporal_z_threshold: f64,
    retention: usize,
    metrics: Mutex<HashMap<String, MetricState>>,
    detected: Mutex<VecDeque<Anomaly>>,
}

/// Point-in-time detector statistics.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyDetectorStats {
    pub total_anomalies: usize,
    pub metrics_with_baselines: usize,
    pub active_metrics: usize,
}

impl AnomalyDetector {
    pub fn new(baseline_window: usize, z_threshold: f64, temporal_z_threshold: f64) -> Self {
        let retention = crate::config::get().analytics.anomaly_retention;
        Self {
            baseline_window,
            z_threshold,
            temporal_z_threshold,
            retention,
            metrics: Mutex::new(HashMap::new()),
            detected: Mutex::new(VecDeque::new()),
        }
    }

    /// Build from the global configuration.
    pub fn from_config() -> Self {
        let cfg = &crate::config::get().analytics;
        Self::new(
            cfg.baseline_window_points,
            cfg.z_threshold,
            cfg.temporal_z_threshold,
        )
    }

    /// Record a point and test it against the metric's baseline.
    ///
    /// Bounded time: baseline recomputation amortizes over `B` additions and
    /// the temporal test scans a fixed-length window.
    pub fn record(&self, point: &TimeSeriesPoint) -> Option<Anomaly> {
        let mut metrics = self.metrics.lock().expect("anomaly state lock poisoned");
        let state = metrics
            .entry(point.metric_name.clone())
            .or_insert_with(MetricState::default);

        // Temporal test needs the previous point, so run it before appending.
        let temporal = is_temporal_anomaly(state, point.value, self.temporal_z_threshold);

        state.history.push_back(point.value);
        while state.history.len() > self.baseline_window {
            state.history.pop_front();
        }
        state.adds_since_recompute += 1;

        // Recompute once the window first fills, then every B additions.
        if state.history.len() >= self.baseline_window
            && (state.baseline.is_none() || state.adds_since_recompute >= self.baseline_window)
        {
            state.baseline = Some(compute_baseline(&state.history));
            state.adds_since_recompute = 0;
            debug!(metric = %point.metric_name, "Baseline recomputed");
        }

        let statistical = state
            .baseline
            .as_ref()
            .is_some_and(|b| is_statistical_anomaly(b, point.value, self.z_threshold));

        let mut kinds = Vec::new();
        if statistical {
            kinds.push(AnomalyKind::Statistical);
        }
        if temporal {
            kinds.push(AnomalyKind::Temporal);
        }
        if kinds.is_empty() {
            return None;
        }

        let (mean, std_dev) = state
            .baseline
            .as_ref()
            .map(|b| (b.mean, b.std_dev.max(MIN_STD_FLOOR)))
            .unwrap_or((point.value, 1.0));
        let z_score = (point.value - mean) / std_dev;
        let severity = (z_score.abs() / 10.0).min(1.0);

        let anomaly = Anomaly {
            timestamp: point.timestamp,
            metric_name: point.metric_name.clone(),
            value: point.value,
            expected_range: (mean - 3.0 * std_dev, mean + 3.0 * std_dev),
            confidence: (0.85 + 0.1 * kinds.len() as f64).min(1.0),
            kinds,
            severity,
            context: AnomalyContext {
                baseline_mean: mean,
                baseline_std_dev: std_dev,
                z_score,
            },
        };
        drop(metrics);

        self.retain(anomaly.clone());
        Some(anomaly)
    }

    /// Record a behavioral anomaly raised by a higher-layer profiler.
    pub fn flag_behavioral(
        &self,
        metric_name: &str,
        value: f64,
        deviation_magnitude: f64,
    ) -> Anomaly {
        let anomaly = Anomaly {
            timestamp: Utc::now(),
            metric_name: metric_name.to_string(),
            value,
            expected_range: (0.0, 0.0),
            kinds: vec![AnomalyKind::Behavioral],
            confidence: 0.85,
            severity: (deviation_magnitude / 10.0).min(1.0),
            context: AnomalyContext {
                baseline_mean: 0.0,
                baseline_std_dev: 0.0,
                z_score: deviation_magnitude,
            },
        };
        self.retain(anomaly.clone());
        anomaly
    }

    fn retain(&self, anomaly: Anomaly) {
        let mut detected = self.detected.lock().expect("anomaly buffer lock poisoned");
        detected.push_back(anomaly);
        while detected.len() > self.retention {
            detected.pop_front();
        }
    }

    /// Most recent anomalies, newest last.
    pub fn recent_anomalies(&self, limit: usize) -> Vec<Anomaly> {
        let detected = self.detected.lock().expect("anomaly buffer lock poisoned");
        detected
            .iter()
            .rev()
            .take(limit)
            .rev()
            .cloned()
            .collect()
    }

    /// Current baseline for a metric, when one has been computed.
    pub fn baseline(&self, metric_name: &str) -> Option<Baseline> {
        let metrics = self.metrics.lock().expect("anomaly state lock poisoned");
        metrics.get(metric_name).and_then(|s| s.baseline.clone())
    }

    pub fn stats(&self) -> AnomalyDetectorStats {
        let metrics = self.metrics.lock().expect("anomaly state lock poisoned");
        AnomalyDetectorStats {
            total_anomalies: self.detected.lock().expect("anomaly buffer lock poisoned").len(),
            metrics_with_baselines: metrics.values().filter(|s| s.baseline.is_some()).count(),
            active_metrics: metrics.len(),
        }
    }
}

fn compute_baseline(history: &VecDeque<f64>) -> Baseline {
    let values: Vec<f64> = history.iter().copied().collect();
    let count = values.len();
    let mut data = Data::new(values);
    Baseline {
        mean: data.mean().unwrap_or(0.0),
        std_dev: data.std_dev().unwrap_or(0.0),
        min: data.min(),
        max: data.max(),
        median: data.percentile(50),
        q1: data.percentile(25),
        q3: data.percentile(75),
        updated_at: Utc::now(),
        sample_count: count,
    }
}

/// |v − mean| / stddev > threshold, only when the baseline has spread.
fn is_statistical_anomaly(baseline: &Baseline, value: f64, threshold: f64) -> bool {
    if baseline.std_dev <= MIN_STD_FLOOR {
        return false;
    }
    ((value - baseline.mean).abs() / baseline.std_dev) > threshold
}

/// Current delta vs. the mean delta of the last `TEMPORAL_TEST_WINDOW`
/// points, measured in delta standard deviations.
fn is_temporal_anomaly(state: &MetricState, value: f64, threshold: f64) -> bool {
    if state.history.len() < 2 {
        return false;
    }
    let recent: Vec<f64> = state
        .history
        .iter()
        .rev()
        .take(TEMPORAL_TEST_WINDOW)
        .rev()
        .copied()
        .collect();

    let deltas: Vec<f64> = recent.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    if deltas.is_empty() {
        return false;
    }
    let mean_delta = deltas.iter().sum::<f64>() / deltas.len() as f64;
    let std_delta = if deltas.len() > 1 {
        let var = deltas
            .iter()
            .map(|d| (d - mean_delta).powi(2))
            .sum::<f64>()
            / (deltas.len() - 1) as f64;
        var.sqrt()
    } else {
        mean_delta
    };
    if std_delta <= MIN_STD_FLOOR {
        return false;
    }

    let last = *recent.last().expect("recent is non-empty");
    let current_delta = (value - last).abs();
    (current_delta - mean_delta) / std_delta > threshold
}
