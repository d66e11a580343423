//! Engine Configuration - All pipeline thresholds as operator-tunable TOML values
//!
//! Every threshold documented for the processing pipeline is a field in this
//! module. Each struct implements `Default` with values matching the documented
//! constants, ensuring zero-change behavior when no config file is present.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a MeshWarden deployment.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$MESHWARDEN_CONFIG` env var
/// 2. `./meshwarden.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Node identification
    #[serde(default)]
    pub node: NodeInfo,

    /// Ingestion stage tuning (dedup, enrichment, batching)
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Window aggregation and anomaly detection
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// ML ensemble detection
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Threat risk scoring
    #[serde(default)]
    pub assessment: AssessmentConfig,

    /// Alert routing, escalation and suppression
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Remediation execution
    #[serde(default)]
    pub remediation: RemediationConfig,

    /// Threat forecasting
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Multi-region coordination
    #[serde(default)]
    pub fleet: FleetConfig,

    /// Continuous model training
    #[serde(default)]
    pub learning: LearningConfig,

    /// In-process event bus
    #[serde(default)]
    pub bus: BusConfig,

    /// Component health tracking
    #[serde(default)]
    pub health: HealthConfig,
}

impl EngineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$MESHWARDEN_CONFIG` environment variable
    /// 2. `./meshwarden.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("MESHWARDEN_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), node = %config.node.node_id, "Loaded engine config from MESHWARDEN_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from MESHWARDEN_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "MESHWARDEN_CONFIG points to non-existent file, falling back");
            }
        }

        let local = Path::new("meshwarden.toml");
        if local.exists() {
            match Self::load_from_file(local) {
                Ok(config) => {
                    info!(node = %config.node.node_id, "Loaded engine config from ./meshwarden.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./meshwarden.toml, using defaults");
                }
            }
        }

        info!("No config file found, using built-in defaults");
        Self::default()
    }

    /// Load and parse a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Node
// ============================================================================

/// Deployment identity for this engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Stable node identifier used in audit records and fleet membership
    pub node_id: String,
    /// Home region for this node
    pub region: String,
}

impl Default for NodeInfo {
    fn default() -> Self {
        Self {
            node_id: "meshwarden-node".to_string(),
            region: "us-east".to_string(),
        }
    }
}

// ============================================================================
// Ingestion
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Duplicate detection window (seconds)
    pub dedup_window_seconds: u64,
    /// Maximum fingerprints held before eager eviction
    pub dedup_max_entries: usize,
    /// Recent-event window scanned for correlations (seconds)
    pub correlation_window_seconds: u64,
    /// Maximum correlations attached per event
    pub correlation_cap: usize,
    /// Batch flush threshold (events)
    pub batch_size: usize,
    /// Batch flush deadline (seconds since first buffered event)
    pub batch_timeout_seconds: u64,
    /// Sink retry attempts before giving up
    pub sink_retry_attempts: u32,
    /// Base sink retry backoff (seconds), doubled per attempt
    pub sink_retry_base_seconds: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dedup_window_seconds: 60,
            dedup_max_entries: 5_000,
            correlation_window_seconds: 300,
            correlation_cap: 10,
            batch_size: 1_000,
            batch_timeout_seconds: 5,
            sink_retry_attempts: 3,
            sink_retry_base_seconds: 1,
        }
    }
}

// ============================================================================
// Analytics
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Sliding window sizes (seconds); one ring buffer per size per metric
    pub aggregator_windows: Vec<u64>,
    /// Points accumulated between baseline recomputations
    pub baseline_window_points: usize,
    /// Z-score threshold for statistical anomalies
    pub z_threshold: f64,
    /// Z-score threshold for rate-of-change (temporal) anomalies
    pub temporal_z_threshold: f64,
    /// Maximum retained anomalies
    pub anomaly_retention: usize,
    /// Points required before a trend is computed for a metric
    pub trend_min_points: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            aggregator_windows: vec![1, 60, 300, 3_600, 86_400],
            baseline_window_points: 1_000,
            z_threshold: 3.0,
            temporal_z_threshold: 2.5,
            anomaly_retention: 10_000,
            trend_min_points: 100,
        }
    }
}

// ============================================================================
// Detection
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Votes required (out of three detectors) for threat consensus
    pub ensemble_threshold: usize,
    /// Confidence above which the classification is SUSPICIOUS
    pub suspicious_threshold: f64,
    /// Confidence above which the classification is MALICIOUS
    pub malicious_threshold: f64,
    /// Confidence above which the classification is CRITICAL
    pub critical_threshold: f64,
    /// Confidence above which the classification is CATASTROPHIC
    pub catastrophic_threshold: f64,
    /// Traffic events retained in the feature extractor history
    pub feature_history: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            ensemble_threshold: 2,
            suspicious_threshold: 0.50,
            malicious_threshold: 0.70,
            critical_threshold: 0.85,
            catastrophic_threshold: 0.95,
            feature_history: 100,
        }
    }
}

// ============================================================================
// Assessment
// ============================================================================

/// CVSS-style scoring weights. The three group scores blend into the final
/// risk score; each group is a weighted sum of its factors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentConfig {
    /// Blend weight for the base score group
    pub base_weight: f64,
    /// Blend weight for the temporal score group
    pub temporal_weight: f64,
    /// Blend weight for the environmental score group
    pub environmental_weight: f64,
    /// Risk score at or above which the level is CRITICAL
    pub critical_score: f64,
    /// Risk score at or above which the level is HIGH
    pub high_score: f64,
    /// Risk score at or above which the level is MEDIUM
    pub medium_score: f64,
    /// Minimum confidence for auto-remediation eligibility
    pub auto_remediation_confidence_min: f64,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            base_weight: 0.7,
            temporal_weight: 0.15,
            environmental_weight: 0.15,
            critical_score: 9.0,
            high_score: 7.0,
            medium_score: 4.0,
            auto_remediation_confidence_min: 0.75,
        }
    }
}

// ============================================================================
// Routing
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Identical-fingerprint suppression window (seconds)
    pub suppression_dup_window_seconds: u64,
    /// Per (threat_type, source) alert cap inside the suppression window
    pub suppression_max_per_type_source: usize,
    /// Minutes between automatic escalation steps
    pub escalation_step_timeout_minutes: u64,
    /// Escalation sweep cadence (seconds)
    pub escalation_sweep_seconds: u64,
    /// Maximum escalation advances per record
    pub max_escalation: u32,
    /// Per-notification send timeout (seconds)
    pub notification_timeout_seconds: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            suppression_dup_window_seconds: 300,
            suppression_max_per_type_source: 10,
            escalation_step_timeout_minutes: 30,
            escalation_sweep_seconds: 60,
            max_escalation: 2,
            notification_timeout_seconds: 5,
        }
    }
}

// ============================================================================
// Remediation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationConfig {
    /// Default per-step execution timeout (seconds); steps may override
    pub step_timeout_seconds: u64,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            step_timeout_seconds: 30,
        }
    }
}

// ============================================================================
// Forecast
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Events considered for the trend slope
    pub trend_window: usize,
    /// Weight of the seasonal deviation term
    pub seasonal_weight: f64,
    /// Probability above which the whole horizon is a critical window
    pub full_window_threshold: f64,
    /// Probability above which the second half of the horizon is critical
    pub half_window_threshold: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            trend_window: 100,
            seasonal_weight: 0.1,
            full_window_threshold: 0.5,
            half_window_threshold: 0.3,
        }
    }
}

// ============================================================================
// Fleet
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Per-region replication call timeout (milliseconds)
    pub replication_timeout_ms: u64,
    /// Backup regions selected during failover
    pub failover_backup_count: usize,
    /// Bounded in-memory state log capacity
    pub state_log_cap: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            replication_timeout_ms: 100,
            failover_backup_count: 2,
            state_log_cap: 100_000,
        }
    }
}

// ============================================================================
// Learning
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Per-model retraining cadence (hours)
    pub training_schedule_hours: u64,
    /// Minimum dataset size before a training run proceeds
    pub training_min_samples: usize,
    /// Minimum test-accuracy gain required to promote a new model
    pub deploy_improvement_threshold: f64,
    /// Feedback buffer capacity (oldest dropped on overflow)
    pub feedback_buffer_cap: usize,
    /// Buffer growth since last train that also triggers retraining
    pub retrain_growth_threshold: usize,
    /// Random-search trials during hyperparameter optimization
    pub tuner_random_trials: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            training_schedule_hours: 1,
            training_min_samples: 10,
            deploy_improvement_threshold: 0.02,
            feedback_buffer_cap: 10_000,
            retrain_growth_threshold: 100,
            tuner_random_trials: 10,
        }
    }
}

// ============================================================================
// Bus
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Per-subscriber queue bound (oldest dropped on overflow)
    pub per_subscriber_cap: usize,
    /// Rolling published-id dedup set capacity
    pub id_dedup_cap: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            per_subscriber_cap: 1_000,
            id_dedup_cap: 10_000,
        }
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Rolling latency samples retained per component
    pub latency_window: usize,
    /// Error rate at or above which a component is unhealthy
    pub error_rate_max: f64,
    /// Average latency at or above which a component is unhealthy (ms)
    pub latency_max_ms: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            latency_window: 1_000,
            error_rate_max: 0.05,
            latency_max_ms: 500.0,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
