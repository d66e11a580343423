//! Sliding Window Store — fixed-duration ring buffers keyed by metric id
//!
//! Each metric owns one ring buffer per configured window size. Adding a
//! point appends to every window in O(1); overflow discards the oldest
//! point. Buffers hold twice their nominal size so summaries straddling a
//! window boundary stay stable.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::config::defaults::WINDOW_OVERLAP_FACTOR;
use crate::types::TimeSeriesPoint;

/// Ring buffers for a single metric, keyed by window size (seconds).
type MetricWindows = HashMap<u64, VecDeque<TimeSeriesPoint>>;

/// Sliding-window point store for all metrics.
pub struct WindowStore {
    /// Window sizes in seconds, ascending
    window_sizes: Vec<u64>,
    metrics: Mutex<HashMap<String, MetricWindows>>,
    processed_points: AtomicU64,
}

/// Point-in-time store statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WindowStoreStats {
    pub processed_total: u64,
    pub active_metrics: usize,
    pub stored_points: usize,
}

impl WindowStore {
    pub fn new(window_sizes: Vec<u64>) -> Self {
        Self {
            window_sizes,
            metrics: Mutex::new(HashMap::new()),
            processed_points: AtomicU64::new(0),
        }
    }

    /// Build from the global configuration (1s/1m/5m/1h/1d by default).
    pub fn from_config() -> Self {
        Self::new(crate::config::get().analytics.aggregator_windows.clone())
    }

    /// Append a point to every window ring for its metric.
    pub fn add_point(&self, point: TimeSeriesPoint) {
        let mut metrics = self.metrics.lock().expect("window store lock poisoned");
        let windows = metrics
            .entry(point.metric_name.clone())
            .or_insert_with(HashMap::new);

        for &size in &self.window_sizes {
            let ring = windows
                .entry(size)
                .or_insert_with(|| VecDeque::with_capacity(64));
            ring.push_back(point.clone());

            // One point per second nominal rate; keep 2x for overlap.
            let cap = (size as usize).saturating_mul(WINDOW_OVERLAP_FACTOR).max(2);
            while ring.len() > cap {
                ring.pop_front();
            }
        }
        self.processed_points.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the points currently in a (metric, window) ring.
    ///
    /// Returns an empty vec for unknown metrics or window sizes.
    pub fn snapshot(&self, metric_name: &str, window_seconds: u64) -> Vec<TimeSeriesPoint> {
        let metrics = self.metrics.lock().expect("window store lock poisoned");
        metrics
            .get(metric_name)
            .and_then(|windows| windows.get(&window_seconds))
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Configured window sizes, ascending.
    pub fn window_sizes(&self) -> &[u64] {
        &self.window_sizes
    }

    /// All metric names currently tracked.
    pub fn metric_names(&self) -> Vec<String> {
        let metrics = self.metrics.lock().expect("window store lock poisoned");
        metrics.keys().cloned().collect()
    }

    pub fn stats(&self) -> WindowStoreStats {
        let metrics = self.metrics.lock().expect("window store lock poisoned");
        let stored = metrics
            .values()
            .flat_map(|windows| windows.values())
            .map(|ring| ring.len())
            .sum();
        WindowStoreStats {
            processed_total: self.processed_points.load(Ordering::Relaxed),
            active_metrics: metrics.len(),
            stored_points: stored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_land_in_every_window() {
        let store = WindowStore::new(vec![1, 60]);
        store.add_point(TimeSeriesPoint::new("cpu", 1.0));
        store.add_point(TimeSeriesPoint::new("cpu", 2.0));

        assert_eq!(store.snapshot("cpu", 1).len(), 2);
        assert_eq!(store.snapshot("cpu", 60).len(), 2);
        assert!(store.snapshot("cpu", 300).is_empty());
        assert!(store.snapshot("mem", 1).is_empty());
    }

    #[test]
    fn overflow_discards_oldest() {
        let store = WindowStore::new(vec![1]);
        // Capacity for the 1 s window is 2 (overlap factor).
        for v in 0..5 {
            store.add_point(TimeSeriesPoint::new("cpu", v as f64));
        }
        let points = store.snapshot("cpu", 1);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].value, 3.0);
        assert_eq!(points[1].value, 4.0);
    }

    #[test]
    fn stats_count_points_across_windows() {
        let store = WindowStore::new(vec![60, 300]);
        for _ in 0..10 {
            store.add_point(TimeSeriesPoint::new("cpu", 1.0));
        }
        let stats = store.stats();
        assert_eq!(stats.processed_total, 10);
        assert_eq!(stats.active_metrics, 1);
        assert_eq!(stats.stored_points, 20);
    }
}
