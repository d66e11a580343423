//! Automated response module
//!
//! The back half of the pipeline, driven per threat by the workflow
//! orchestrator:
//!
//! ```text
//! ThreatSignal → Assessor → Router (+ suppression/escalation)
//!                        → Remediation (when eligible) → Incident
//! ```
//!
//! Each stage returns a result value; failures never cross a component
//! boundary as panics. The orchestrator is the single source of truth for
//! workflow status.

mod assessment;
mod routing;
mod remediation;
mod incident;
mod workflow;

pub use assessment::ThreatAssessor;
pub use incident::{IncidentError, IncidentManager};
pub use remediation::{
    ActionExecutor, ExecutorError, PlaybookRegistry, RemediationExecutor,
};
pub use routing::{
    AlertRouter, EscalationAdvance, EscalationManager, SuppressionFilter,
};
pub use workflow::{WorkflowOrchestrator, WorkflowResult, WorkflowStats, WorkflowStatus};
