//! Metric analytics module
//!
//! Sliding-window storage and the derived statistics layered on top of it:
//!
//! - `WindowStore` (ring buffers per metric per window size)
//! - `Aggregator` (count/min/max/mean/stddev/percentile summaries)
//! - `AnomalyDetector` (baseline z-score + rate-of-change tests)
//! - `TrendAnalyzer` (linear trend and growth rate per metric)
//! - `Forecaster` (trend + seasonality + momentum threat probability)

mod window;
mod aggregator;
mod anomaly;
mod trend;
mod forecast;

pub use aggregator::Aggregator;
pub use anomaly::{AnomalyDetector, AnomalyDetectorStats, Baseline};
pub use forecast::Forecaster;
pub use trend::{MetricTrend, TrendAnalyzer, TrendDirection};
pub use window::{WindowStore, WindowStoreStats};
