//! Processing Pipeline Module
//!
//! ## Stage Sequence
//!
//! ```text
//! STAGE 1: Ingestion (dedup → drop duplicates)
//! STAGE 2: Enrichment (severity, intel context, correlations)
//! STAGE 3: Batching (count-or-deadline flush to sinks)
//! STAGE 4: Metric analytics (windows, summaries, baselines, trends)
//! STAGE 5: Anomaly detection (per metric append)
//! STAGE 6: Threat detection (features → ensemble, threat events only)
//! STAGE 7: Response workflow (assessment → routing → remediation → incident)
//! STAGE 8: Forecast history + learning feedback
//! ```
//!
//! Stages 6-7 only execute for threat-bearing events; metric events stop
//! after stage 5. The health monitor observes every stage.

mod coordinator;

pub use coordinator::{EventPipeline, PipelineStats};
