//! Trend Analyzer — per-metric linear trend and growth rate
//!
//! Maintains a bounded history per metric and fits a degree-1 least-squares
//! line once enough points have accumulated. Feeds the forecaster and the
//! query surface.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::types::TimeSeriesPoint;

/// History retained per metric (points).
const TREND_HISTORY_CAP: usize = 43_200;

/// Trend direction derived from the fitted slope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
}

/// Fitted trend for one metric.
#[derive(Debug, Clone, Serialize)]
pub struct MetricTrend {
    pub slope: f64,
    pub growth_rate_percent: f64,
    pub direction: TrendDirection,
    pub current_value: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub updated_at: DateTime<Utc>,
}

/// Per-metric trend tracker.
pub struct TrendAnalyzer {
    min_points: usize,
    history: Mutex<HashMap<String, VecDeque<f64>>>,
    trends: Mutex<HashMap<String, MetricTrend>>,
}

impl TrendAnalyzer {
    pub fn new(min_points: usize) -> Self {
        Self {
            min_points,
            history: Mutex::new(HashMap::new()),
            trends: Mutex::new(HashMap::new()),
        }
    }

    /// Build from the global configuration.
    pub fn from_config() -> Self {
        Self::new(crate::config::get().analytics.trend_min_points)
    }

    /// Record a point and refresh the trend once enough history exists.
    pub fn add_point(&self, point: &TimeSeriesPoint) {
        let values: Vec<f64> = {
            let mut history = self.history.lock().expect("trend history lock poisoned");
            let ring = history
                .entry(point.metric_name.clone())
                .or_insert_with(VecDeque::new);
            ring.push_back(point.value);
            while ring.len() > TREND_HISTORY_CAP {
                ring.pop_front();
            }
            if ring.len() <= self.min_points {
                return;
            }
            ring.iter().copied().collect()
        };

        let slope = linear_slope(&values);
        let half = values.len().min(100);
        let recent: f64 = values.iter().rev().take(half).sum::<f64>() / half as f64;
        let old: f64 = values.iter().take(half).sum::<f64>() / half as f64;
        let growth = if old != 0.0 {
            (recent - old) / old * 100.0
        } else {
            0.0
        };

        let trend = MetricTrend {
            slope,
            growth_rate_percent: growth,
            direction: if slope > 0.0 {
                TrendDirection::Increasing
            } else {
                TrendDirection::Decreasing
            },
            current_value: *values.last().expect("non-empty values"),
            average: values.iter().sum::<f64>() / values.len() as f64,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            updated_at: Utc::now(),
        };
        self.trends
            .lock()
            .expect("trend table lock poisoned")
            .insert(point.metric_name.clone(), trend);
    }

    /// Current trend for a metric, when computed.
    pub fn trend(&self, metric_name: &str) -> Option<MetricTrend> {
        self.trends
            .lock()
            .expect("trend table lock poisoned")
            .get(metric_name)
            .cloned()
    }

    /// Number of metrics with a computed trend.
    pub fn tracked_count(&self) -> usize {
        self.trends.lock().expect("trend table lock poisoned").len()
    }
}

/// Degree-1 least-squares slope over values indexed 0..n.
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = values.iter().sum::<f64>() / n_f;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slope_of_linear_series_is_exact() {
        let values: Vec<f64> = (0..100).map(|i| 3.0 * i as f64 + 7.0).collect();
        assert!((linear_slope(&values) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn slope_of_constant_series_is_zero() {
        let values = vec![5.0; 50];
        assert_eq!(linear_slope(&values), 0.0);
    }

    #[test]
    fn trend_appears_after_min_points() {
        let analyzer = TrendAnalyzer::new(10);
        for i in 0..10 {
            analyzer.add_point(&TimeSeriesPoint::new("conn", i as f64));
        }
        assert!(analyzer.trend("conn").is_none());

        analyzer.add_point(&TimeSeriesPoint::new("conn", 10.0));
        let trend = analyzer.trend("conn").expect("trend");
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!(trend.slope > 0.0);
        assert_eq!(trend.current_value, 10.0);
    }
}
