//! Workflow Orchestrator — assessment → routing → remediation → incident
//!
//! Drives the response chain for each threat signal and is the single
//! source of truth for workflow status. Stage failures never propagate as
//! panics: a failed remediation marks the workflow FAILED after running the
//! remediation rollback path, and every outcome is published on the bus for
//! observers.

use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::bus::EventBus;
use crate::identity;
use crate::storage::NotificationSender;
use crate::types::{
    ExecutionStatus, Incident, IncidentSeverity, RemediationExecution, RoutedAlert,
    ThreatAssessment, ThreatSignal,
};

use super::assessment::ThreatAssessor;
use super::incident::IncidentManager;
use super::remediation::{PlaybookRegistry, RemediationExecutor};
use super::routing::{AlertRouter, EscalationManager, SuppressionFilter};

/// Terminal workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkflowStatus {
    Completed,
    Suppressed,
    Failed,
}

/// Result of one threat workflow.
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub threat_id: String,
    pub status: WorkflowStatus,
    pub assessment: Option<ThreatAssessment>,
    pub alert: Option<RoutedAlert>,
    pub execution: Option<RemediationExecution>,
    pub incident: Option<Incident>,
    pub error: Option<String>,
}

/// Aggregate workflow statistics.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStats {
    pub executed: u64,
    pub suppressed: u64,
    pub auto_remediations: u64,
    pub failed: u64,
}

/// End-to-end response orchestrator.
pub struct WorkflowOrchestrator {
    assessor: ThreatAssessor,
    router: AlertRouter,
    suppression: SuppressionFilter,
    escalation: Arc<EscalationManager>,
    remediation: RemediationExecutor,
    playbooks: PlaybookRegistry,
    incidents: IncidentManager,
    bus: Arc<EventBus>,
    notifiers: Vec<Arc<dyn NotificationSender>>,
    executed: AtomicU64,
    suppressed: AtomicU64,
    auto_remediations: AtomicU64,
    failed: AtomicU64,
}

impl WorkflowOrchestrator {
    pub fn new(
        remediation: RemediationExecutor,
        playbooks: PlaybookRegistry,
        bus: Arc<EventBus>,
        notifiers: Vec<Arc<dyn NotificationSender>>,
    ) -> Self {
        Self {
            assessor: ThreatAssessor::new(),
            router: AlertRouter::default(),
            suppression: SuppressionFilter::from_config(),
            escalation: Arc::new(EscalationManager::from_config()),
            remediation,
            playbooks,
            incidents: IncidentManager::new(),
            bus,
            notifiers,
            executed: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            auto_remediations: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// The alert router, for route-table swaps at runtime.
    pub fn router(&self) -> &AlertRouter {
        &self.router
    }

    /// The escalation manager, for the periodic sweep task.
    pub fn escalation(&self) -> Arc<EscalationManager> {
        Arc::clone(&self.escalation)
    }

    /// The incident manager, for lifecycle updates by operators.
    pub fn incidents(&self) -> &IncidentManager {
        &self.incidents
    }

    /// Run the full response workflow for one threat signal.
    ///
    /// Steps are strictly sequential within a workflow; concurrent
    /// workflows interleave freely.
    pub async fn handle_threat(&self, signal: ThreatSignal) -> WorkflowResult {
        let workflow_id = identity::execution_id();
        self.executed.fetch_add(1, Ordering::Relaxed);

        self.bus.publish_json(
            "threat_detected",
            json!({
                "workflow_id": workflow_id,
                "threat_id": signal.threat_id,
                "threat_type": signal.threat_type,
                "source": signal.source,
            }),
        );

        // Assessment is pure computation over the signal.
        let assessment = self.assessor.assess(&signal);

        // Suppression short-circuits routing, remediation, and incidents.
        if self.suppression.should_suppress(&signal) {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            info!(threat_id = %signal.threat_id, "Alert suppressed");
            return WorkflowResult {
                workflow_id,
                threat_id: signal.threat_id,
                status: WorkflowStatus::Suppressed,
                assessment: Some(assessment),
                alert: None,
                execution: None,
                incident: None,
                error: None,
            };
        }

        let alert = self.router.route(&signal, &assessment);
        self.escalation.open(&alert);
        self.dispatch_notifications(&alert).await;

        // Auto-remediation only when the assessment clears the gate.
        let mut execution = None;
        if assessment.should_auto_remediate {
            self.auto_remediations.fetch_add(1, Ordering::Relaxed);
            match self.playbooks.select(&signal.threat_type) {
                Some(mut playbook) => {
                    for step in &mut playbook.steps {
                        if step.target.is_empty() {
                            step.target = signal.source.clone();
                        }
                    }
                    let run = self
                        .remediation
                        .execute_playbook(&playbook, &signal.threat_id)
                        .await;

                    if run.status != ExecutionStatus::Completed {
                        // A required step failed. For FAILED the rollback
                        // path has not run yet, so attempt it here; a
                        // ROLLED_BACK execution already reversed its
                        // completed steps. Either way the workflow is the
                        // failure of record.
                        if run.status == ExecutionStatus::Failed {
                            let rolled = self.remediation.rollback_execution(&run).await;
                            warn!(
                                workflow_id = %workflow_id,
                                threat_id = %signal.threat_id,
                                rolled_back = rolled.len(),
                                "Remediation failed — completed steps rolled back"
                            );
                        }
                        self.failed.fetch_add(1, Ordering::Relaxed);
                        self.bus.publish_json(
                            "workflow_failed",
                            json!({
                                "workflow_id": workflow_id,
                                "threat_id": signal.threat_id,
                                "execution_id": run.execution_id,
                                "execution_status": run.status.to_string(),
                            }),
                        );
                        return WorkflowResult {
                            workflow_id,
                            threat_id: signal.threat_id,
                            status: WorkflowStatus::Failed,
                            assessment: Some(assessment),
                            alert: Some(alert),
                            execution: Some(run),
                            incident: None,
                            error: Some("required remediation step failed".to_string()),
                        };
                    }
                    execution = Some(run);
                }
                None => {
                    warn!(
                        threat_type = %signal.threat_type,
                        "No playbook available for auto-remediation"
                    );
                }
            }
        }

        let incident = self.incidents.create_incident(
            &signal.threat_id,
            IncidentSeverity::from_risk_level(assessment.risk_level),
            signal.affected_assets.clone(),
            alert.assigned_teams.clone(),
        );
        if let Some(run) = &execution {
            // The incident was just created; a missing id here is a bug.
            self.incidents
                .attach_remediation(&incident.id, &run.execution_id)
                .ok();
        }

        self.bus.publish_json(
            "assessment_complete",
            json!({
                "workflow_id": workflow_id,
                "threat_id": signal.threat_id,
                "risk_score": assessment.risk_score,
                "risk_level": assessment.risk_level.to_string(),
                "incident_id": incident.id,
                "auto_remediated": execution.is_some(),
            }),
        );

        info!(
            workflow_id = %workflow_id,
            threat_id = %signal.threat_id,
            risk_level = %assessment.risk_level,
            incident_id = %incident.id,
            auto_remediated = execution.is_some(),
            "Workflow complete"
        );

        WorkflowResult {
            workflow_id,
            threat_id: signal.threat_id,
            status: WorkflowStatus::Completed,
            assessment: Some(assessment),
            alert: Some(alert),
            execution,
            incident: Some(self.incidents.get(&incident.id).unwrap_or(incident)),
            error: None,
        }
    }

    /// Dispatch the alert's notifications to every sender, each bounded by
    /// the notification timeout. Failures are logged and never fail the
    /// workflow.
    async fn dispatch_notifications(&self, alert: &RoutedAlert) {
        let timeout =
            Duration::from_secs(crate::config::get().routing.notification_timeout_seconds);
        for notification in &alert.notifications {
            for notifier in &self.notifiers {
                match tokio::time::timeout(timeout, notifier.send(notification)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(
                            notifier = notifier.name(),
                            channel = %notification.channel,
                            error = %e,
                            "Notification send failed"
                        );
                    }
                    Err(_) => {
                        warn!(
                            notifier = notifier.name(),
                            channel = %notification.channel,
                            "Notification send timed out"
                        );
                    }
                }
            }
        }
    }

    pub fn stats(&self) -> WorkflowStats {
        WorkflowStats {
            executed: self.executed.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            auto_remediations: self.auto_remediations.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
