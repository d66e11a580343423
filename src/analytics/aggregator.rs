//! Aggregator — multi-resolution online summary statistics
//!
//! Reads a window ring into a stats struct: count, sum, min, max, mean,
//! stddev and the p50/p95/p99 percentiles. Percentiles use a sorted copy,
//! acceptable for rings bounded at twice the window size. Windows holding
//! fewer than two points yield no summary.

use statrs::statistics::{Data, Distribution, Max, Min, OrderStatistics};
use std::sync::Arc;

use crate::types::AggregatedMetrics;

use super::window::WindowStore;

/// Summary-statistics layer over the window store.
pub struct Aggregator {
    store: Arc<WindowStore>,
}

impl Aggregator {
    pub fn new(store: Arc<WindowStore>) -> Self {
        Self { store }
    }

    /// Summarize a (metric, window) pair.
    ///
    /// Returns `None` when the window holds fewer than two points
    /// (insufficient data) or the window size is unknown.
    pub fn aggregate(&self, metric_name: &str, window_seconds: u64) -> Option<AggregatedMetrics> {
        let points = self.store.snapshot(metric_name, window_seconds);
        if points.len() < 2 {
            return None;
        }

        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        let count = values.len();
        let sum: f64 = values.iter().sum();
        let mut data = Data::new(values);

        Some(AggregatedMetrics {
            window_start: points.first()?.timestamp,
            window_end: points.last()?.timestamp,
            metric_name: metric_name.to_string(),
            count,
            sum,
            min: data.min(),
            max: data.max(),
            mean: data.mean().unwrap_or(0.0),
            std_dev: data.std_dev().unwrap_or(0.0),
            p50: data.percentile(50),
            p95: data.percentile(95),
            p99: data.percentile(99),
        })
    }

    /// Summaries for one metric across every configured window.
    pub fn aggregate_all_windows(&self, metric_name: &str) -> Vec<AggregatedMetrics> {
        self.store
            .window_sizes()
            .to_vec()
            .into_iter()
            .filter_map(|size| self.aggregate(metric_name, size))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeSeriesPoint;

    fn store_with_values(values: &[f64]) -> Arc<WindowStore> {
        let store = Arc::new(WindowStore::new(vec![3_600]));
        for &v in values {
            store.add_point(TimeSeriesPoint::new("latency", v));
        }
        store
    }

    #[test]
    fn insufficient_data_yields_none() {
        let aggregator = Aggregator::new(store_with_values(&[5.0]));
        assert!(aggregator.aggregate("latency", 3_600).is_none());
        assert!(aggregator.aggregate("unknown", 3_600).is_none());
    }

    #[test]
    fn summary_matches_known_values() {
        let aggregator = Aggregator::new(store_with_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]));
        let summary = aggregator.aggregate("latency", 3_600).expect("summary");

        assert_eq!(summary.count, 8);
        assert_eq!(summary.sum, 40.0);
        assert_eq!(summary.min, 2.0);
        assert_eq!(summary.max, 9.0);
        assert!((summary.mean - 5.0).abs() < 1e-9);
        // Sample standard deviation of the classic Welford example
        assert!((summary.std_dev - 2.138).abs() < 0.01);
    }

    #[test]
    fn percentiles_are_ordered_between_min_and_max() {
        let values: Vec<f64> = (0..200).map(|v| v as f64).collect();
        let aggregator = Aggregator::new(store_with_values(&values));
        let summary = aggregator.aggregate("latency", 3_600).expect("summary");

        assert!(summary.min <= summary.p50);
        assert!(summary.p50 <= summary.p95);
        assert!(summary.p95 <= summary.p99);
        assert!(summary.p99 <= summary.max);
    }
}
