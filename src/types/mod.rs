//! Shared data structures for the security telemetry pipeline
//!
//! This module defines the core types flowing through the engine:
//! - Ingestion: RawEvent, EnrichedEvent, TimeSeriesPoint (dedup → enrich → batch)
//! - Analytics: AggregatedMetrics, Anomaly (windows → baselines → detection)
//! - Detection: TrafficEvent, DetectionResult (features → ensemble voting)
//! - Response: ThreatAssessment, RoutedAlert, RemediationExecution, Incident
//! - Fleet: Workload, StateChange, CoordinationResult (cross-region state)
//! - Learning: OperationalFeedback, TrainedModel (feedback → retrain → promote)

mod event;
mod detection;
mod assessment;
mod response;
mod fleet;
mod learning;
mod forecast;

pub use event::*;
pub use detection::*;
pub use assessment::*;
pub use response::*;
pub use fleet::*;
pub use learning::*;
pub use forecast::*;
