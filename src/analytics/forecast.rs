//! Forecaster — near-future threat probability from trend, seasonality,
//! and momentum
//!
//! Probability over a horizon is the current threat level plus the fitted
//! severity trend extrapolated across the horizon, nudged by the hour-of-day
//! seasonal deviation, clipped to [0, 1]. Confidence tiers follow history
//! size. Critical windows cover the whole horizon above the full-window
//! threshold and the second half above the half-window threshold.

use chrono::{DateTime, Duration, Timelike, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use tracing::debug;

use crate::types::{CriticalWindow, PreparednessLevel, ThreatForecast, ThreatHistoryEvent};

use super::trend::linear_slope;

/// Threat events retained as forecasting history.
const FORECAST_HISTORY_CAP: usize = 10_000;

/// Threat probability forecaster.
pub struct Forecaster {
    trend_window: usize,
    seasonal_weight: f64,
    full_window_threshold: f64,
    half_window_threshold: f64,
    history: Mutex<VecDeque<ThreatHistoryEvent>>,
    type_counts: Mutex<HashMap<String, usize>>,
}

impl Forecaster {
    pub fn new(
        trend_window: usize,
        seasonal_weight: f64,
        full_window_threshold: f64,
        half_window_threshold: f64,
    ) -> Self {
        Self {
            trend_window,
            seasonal_weight,
            full_window_threshold,
            half_window_threshold,
            history: Mutex::new(VecDeque::new()),
            type_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Build from the global configuration.
    pub fn from_config() -> Self {
        let cfg = &crate::config::get().forecast;
        Self::new(
            cfg.trend_window,
            cfg.seasonal_weight,
            cfg.full_window_threshold,
            cfg.half_window_threshold,
        )
    }

    /// Record a threat event into the forecasting history.
    pub fn record_event(&self, event: ThreatHistoryEvent) {
        {
            let mut counts = self.type_counts.lock().expect("type counts lock poisoned");
            *counts.entry(event.threat_type.clone()).or_insert(0) += 1;
        }
        let mut history = self.history.lock().expect("forecast history lock poisoned");
        history.push_back(event);
        while history.len() > FORECAST_HISTORY_CAP {
            history.pop_front();
        }
    }

    /// Forecast threat probability over the horizon starting now.
    pub fn forecast(&self, current_threat_level: f64, horizon: Duration) -> ThreatForecast {
        self.forecast_at(current_threat_level, horizon, Utc::now())
    }

    /// Forecast with an explicit "now", used by deterministic tests.
    pub fn forecast_at(
        &self,
        current_threat_level: f64,
        horizon: Duration,
        now: DateTime<Utc>,
    ) -> ThreatForecast {
        let (trend, seasonality, history_len) = {
            let history = self.history.lock().expect("forecast history lock poisoned");
            (
                self.compute_trend(&history),
                compute_seasonality(&history),
                history.len(),
            )
        };

        let horizon_hours = horizon.num_seconds() as f64 / 3_600.0;
        let seasonal_factor = seasonality
            .get(&now.hour())
            .copied()
            .unwrap_or(0.5);

        let raw = current_threat_level
            + trend * horizon_hours
            + self.seasonal_weight * (seasonal_factor - 0.5);
        let probability = raw.clamp(0.0, 1.0);

        let confidence = confidence_for_history(history_len);
        let critical_windows = self.critical_windows(probability, now, horizon);
        let expected_type = self.expected_threat_type();

        debug!(
            probability = probability,
            trend = trend,
            seasonal = seasonal_factor,
            confidence = confidence,
            "Threat forecast computed"
        );

        ThreatForecast {
            forecast_start: now,
            forecast_end: now + horizon,
            threat_probability: probability,
            expected_threat_type: expected_type.clone(),
            expected_severity: probability,
            confidence,
            critical_windows,
            resource_requirements: estimate_resources(probability),
            recommended_actions: recommendations(probability, &expected_type),
        }
    }

    /// Severity slope of the last `trend_window` events.
    fn compute_trend(&self, history: &VecDeque<ThreatHistoryEvent>) -> f64 {
        if history.len() < 2 {
            return 0.0;
        }
        let severities: Vec<f64> = history
            .iter()
            .rev()
            .take(self.trend_window)
            .rev()
            .map(|e| e.severity)
            .collect();
        linear_slope(&severities)
    }

    fn critical_windows(
        &self,
        probability: f64,
        now: DateTime<Utc>,
        horizon: Duration,
    ) -> Vec<CriticalWindow> {
        if probability > self.full_window_threshold {
            vec![CriticalWindow {
                start: now,
                end: now + horizon,
                threat_probability: probability,
                preparedness: PreparednessLevel::for_probability(probability),
            }]
        } else if probability > self.half_window_threshold {
            let half = horizon / 2;
            vec![CriticalWindow {
                start: now + half,
                end: now + horizon,
                threat_probability: probability,
                preparedness: PreparednessLevel::for_probability(probability),
            }]
        } else {
            Vec::new()
        }
    }

    /// Most frequent threat type across the full history.
    fn expected_threat_type(&self) -> String {
        let counts = self.type_counts.lock().expect("type counts lock poisoned");
        counts
            .iter()
            .max_by_key(|(_, &count)| count)
            .map(|(t, _)| t.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Events currently retained.
    pub fn history_len(&self) -> usize {
        self.history.lock().expect("forecast history lock poisoned").len()
    }
}

/// Per-hour-of-day probability mass over the full history.
fn compute_seasonality(history: &VecDeque<ThreatHistoryEvent>) -> BTreeMap<u32, f64> {
    if history.len() < 24 {
        return BTreeMap::new();
    }
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for event in history.iter() {
        *counts.entry(event.timestamp.hour()).or_insert(0) += 1;
    }
    let total = history.len() as f64;
    counts
        .into_iter()
        .map(|(hour, count)| (hour, count as f64 / total))
        .collect()
}

/// Confidence tiers by history size.
fn confidence_for_history(len: usize) -> f64 {
    if len < 10 {
        0.3
    } else if len < 100 {
        0.5
    } else if len < 1_000 {
        0.7
    } else {
        0.9
    }
}

/// Base resource estimates scaled by forecast probability.
fn estimate_resources(probability: f64) -> BTreeMap<String, f64> {
    let base: [(&str, f64); 4] = [
        ("cpu_percent", 10.0),
        ("memory_mb", 256.0),
        ("agents_needed", 1.0),
        ("network_mbps", 50.0),
    ];
    base.iter()
        .map(|(name, value)| (name.to_string(), value * probability))
        .collect()
}

fn recommendations(probability: f64, threat_type: &str) -> Vec<String> {
    let mut actions = Vec::new();
    if probability > 0.8 {
        actions.push("Increase monitoring intensity".to_string());
        actions.push("Pre-allocate response resources".to_string());
        actions.push("Alert security team".to_string());
    } else if probability > 0.6 {
        actions.push("Enable enhanced logging".to_string());
        actions.push("Prepare incident playbook".to_string());
    } else if probability > 0.4 {
        actions.push("Monitor threat indicators".to_string());
    }
    match threat_type {
        "port_scan" => actions.push("Enable port monitoring".to_string()),
        "ssh_brute_force" | "brute_force" => {
            actions.push("Strengthen authentication".to_string())
        }
        _ => {}
    }
    actions
}
