//! MeshWarden: Security Telemetry & Automated Response
//!
//! Real-time event processing engine and response orchestrator for a mesh
//! VPN fleet.
//!
//! ## Architecture
//!
//! - **Ingestion**: dedup → enrichment → batched persistence
//! - **Analytics**: sliding windows, summaries, baselines, trends, forecasts
//! - **Detection**: feature extraction + three-detector ML ensemble
//! - **Response**: CVSS-style assessment, alert routing, reversible
//!   remediation, incident lifecycle — chained by the workflow orchestrator
//! - **Fleet**: multi-region state replication with logical clocks,
//!   last-writer-wins convergence, and failover
//! - **Learning**: feedback-driven retraining with gated model promotion

pub mod config;
pub mod types;
pub mod identity;
pub mod ingest;
pub mod analytics;
pub mod detection;
pub mod response;
pub mod fleet;
pub mod learning;
pub mod bus;
pub mod health;
pub mod storage;
pub mod pipeline;
pub mod api;

// Re-export engine configuration
pub use config::EngineConfig;

// Re-export commonly used types
pub use types::{
    AggregatedMetrics, Anomaly, AnomalyKind, DetectionResult, EnrichedEvent, EventKind,
    Incident, IncidentSeverity, IncidentStatus, RawEvent, RiskLevel, RoutedAlert, Severity,
    ThreatAssessment, ThreatClassification, ThreatSignal, TimeSeriesPoint, TrafficEvent,
};

// Re-export the pipeline and workflow entry points
pub use pipeline::{EventPipeline, PipelineStats};
pub use response::{WorkflowOrchestrator, WorkflowResult, WorkflowStatus};

// Re-export fleet coordination
pub use fleet::{DistributedState, FailoverDriver, RegionCoordinator};

// Re-export learning
pub use learning::LearningFramework;

// Re-export observability surfaces
pub use bus::{BusEvent, EventBus};
pub use health::{HealthMonitor, SystemState};
