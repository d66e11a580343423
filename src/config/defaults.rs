//! System-wide default constants.
//!
//! Centralises magic numbers shared across subsystems. Anything an operator
//! may want to tune lives in `EngineConfig` instead; these are structural
//! bounds that the pipeline depends on.

// ============================================================================
// Pipeline
// ============================================================================

/// Traffic events retained for feature extraction (sliding history).
pub const FEATURE_HISTORY_SIZE: usize = 100;

/// Detection results retained for statistics.
pub const DETECTION_HISTORY_SIZE: usize = 1_000;

/// Rolling buffer of recent enriched events kept for correlation scans.
pub const CORRELATION_BUFFER_SIZE: usize = 10_000;

// ============================================================================
// Windows
// ============================================================================

/// Overlap multiplier for sliding-window ring buffers: each window keeps
/// twice its nominal size so summaries at the window boundary stay stable.
pub const WINDOW_OVERLAP_FACTOR: usize = 2;

/// Samples inspected by the temporal (rate-of-change) anomaly test.
pub const TEMPORAL_TEST_WINDOW: usize = 10;

/// Minimum standard deviation floor to avoid divide-by-zero in z-scores.
pub const MIN_STD_FLOOR: f64 = 1e-9;

// ============================================================================
// Fleet
// ============================================================================

/// Failover history retained by the failover driver.
pub const FAILOVER_HISTORY_SIZE: usize = 1_000;

/// Coordination overhead reported as a fraction of wall time when the
/// replicator does not supply its own measurement.
pub const COORDINATION_OVERHEAD_FRACTION: f64 = 0.1;

// ============================================================================
// Learning
// ============================================================================

/// Training runs retained per model trainer.
pub const TRAINING_HISTORY_SIZE: usize = 100;

/// Train/validation split fraction.
pub const TRAIN_SPLIT_FRACTION: f64 = 0.8;
