//! Response workflow integration tests: assessment gating, routing
//! fan-out, remediation rollback ordering, and incident lifecycle.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use meshwarden::bus::EventBus;
use meshwarden::response::{
    ActionExecutor, ExecutorError, PlaybookRegistry, RemediationExecutor, WorkflowOrchestrator,
};
use meshwarden::storage::memory::MemoryNotificationSender;
use meshwarden::storage::NotificationSender;
use meshwarden::types::{
    ActionStatus, AttackVector, CvssFactors, DetectionResult, EscalationLevel, ExecutionStatus,
    IncidentSeverity, IncidentStatus, NotificationChannel, RemediationAction, RemediationPlaybook,
    RemediationStep, ThreatClassification, ThreatSignal,
};
use meshwarden::WorkflowStatus;

struct CountingExecutor {
    action: RemediationAction,
    fail: bool,
    executions: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl CountingExecutor {
    fn new(action: RemediationAction, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            action,
            fail,
            executions: AtomicUsize::new(0),
            rollbacks: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ActionExecutor for CountingExecutor {
    fn action(&self) -> RemediationAction {
        self.action
    }

    async fn execute(
        &self,
        target: &str,
        _parameters: &BTreeMap<String, Value>,
    ) -> Result<Value, ExecutorError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(ExecutorError::ActionFailed("refused".to_string()))
        } else {
            Ok(json!({ "target": target }))
        }
    }

    async fn rollback(&self, _result: &Value) -> Result<(), ExecutorError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn max_factors() -> CvssFactors {
    CvssFactors {
        attack_vector: AttackVector::Network,
        complexity: 1.0,
        privileges_required: 1.0,
        user_interaction: 1.0,
        scope_change: 1.0,
        confidentiality_impact: 1.0,
        integrity_impact: 1.0,
        availability_impact: 1.0,
        exploit_maturity: 1.0,
        remediation_available: 1.0,
        report_confidence: 1.0,
        asset_criticality: 1.0,
        exposure: 1.0,
        business_impact: 1.0,
    }
}

fn signal(fingerprint: &str, confidence: f64, threat_type: &str) -> ThreatSignal {
    ThreatSignal {
        threat_id: format!("threat-{fingerprint}"),
        timestamp: Utc::now(),
        source: "203.0.113.9".to_string(),
        threat_type: threat_type.to_string(),
        fingerprint: fingerprint.to_string(),
        affected_assets: vec!["node-1".to_string(), "node-2".to_string()],
        detection: DetectionResult {
            threat_detected: true,
            classification: ThreatClassification::Critical,
            confidence,
            score: confidence * 100.0,
            primary_type: threat_type.to_string(),
            contributing_models: BTreeMap::new(),
            features_triggered: vec![],
            recommendation: String::new(),
            timestamp: Utc::now(),
        },
        factors: Some(max_factors()),
    }
}

/// Scenario: a CRITICAL threat with high confidence is routed to the
/// security and incident-response teams at CRITICAL escalation with the
/// full channel fan-out, auto-remediates, and opens a SEV1 incident.
#[tokio::test]
async fn critical_threat_auto_remediation_eligibility() {
    let notifier = Arc::new(MemoryNotificationSender::new());
    let bus = Arc::new(EventBus::from_config());
    let block = CountingExecutor::new(RemediationAction::BlockSourceIp, false);
    let orchestrator = WorkflowOrchestrator::new(
        RemediationExecutor::new(vec![
            block.clone(),
            CountingExecutor::new(RemediationAction::CollectEvidence, false),
            CountingExecutor::new(RemediationAction::IncreaseMonitoring, false),
        ]),
        PlaybookRegistry::with_defaults(),
        bus,
        vec![notifier.clone() as Arc<dyn NotificationSender>],
    );

    let result = orchestrator
        .handle_threat(signal("fp-critical", 0.9, "port_scan"))
        .await;

    assert_eq!(result.status, WorkflowStatus::Completed);

    let assessment = result.assessment.unwrap();
    assert!(assessment.risk_score >= 9.0);
    assert!(assessment.should_auto_remediate);

    let alert = result.alert.unwrap();
    assert_eq!(
        alert.assigned_teams,
        vec!["security-team", "incident-response"]
    );
    assert_eq!(alert.escalation_level, EscalationLevel::Critical);
    let channels: std::collections::HashSet<NotificationChannel> =
        alert.notifications.iter().map(|n| n.channel).collect();
    for channel in [
        NotificationChannel::Dashboard,
        NotificationChannel::Email,
        NotificationChannel::Slack,
        NotificationChannel::PagerDuty,
        NotificationChannel::Sms,
    ] {
        assert!(channels.contains(&channel), "{channel} missing");
    }

    assert_eq!(block.executions.load(Ordering::SeqCst), 1);
    let incident = result.incident.unwrap();
    assert_eq!(incident.severity, IncidentSeverity::Sev1);
    assert_eq!(incident.status, IncidentStatus::Detected);
    assert!(!notifier.sent().is_empty());
}

/// Scenario: block succeeds, quarantine fails. The executor rolls block
/// back and the audit sequence reads COMPLETED, FAILED, ROLLED_BACK.
#[tokio::test]
async fn failed_required_step_rolls_back_completed_steps() {
    let block = CountingExecutor::new(RemediationAction::BlockSourceIp, false);
    let quarantine = CountingExecutor::new(RemediationAction::QuarantineNode, true);
    let executor = RemediationExecutor::new(vec![block.clone(), quarantine]);

    let step = |action, priority| RemediationStep {
        action,
        target: "203.0.113.9".to_string(),
        parameters: BTreeMap::new(),
        priority,
        required: true,
        rollback_on_failure: true,
        timeout_seconds: None,
    };
    let playbook = RemediationPlaybook {
        playbook_id: "containment".to_string(),
        name: "Containment".to_string(),
        threat_types: vec!["port_scan".to_string()],
        steps: vec![
            step(RemediationAction::BlockSourceIp, 100),
            step(RemediationAction::QuarantineNode, 50),
        ],
    };

    let execution = executor.execute_playbook(&playbook, "threat-1").await;

    assert_eq!(execution.status, ExecutionStatus::RolledBack);
    let sequence: Vec<(RemediationAction, ActionStatus)> = execution
        .records
        .iter()
        .map(|r| (r.action, r.status))
        .collect();
    assert_eq!(
        sequence,
        vec![
            (RemediationAction::BlockSourceIp, ActionStatus::Completed),
            (RemediationAction::QuarantineNode, ActionStatus::Failed),
            (RemediationAction::BlockSourceIp, ActionStatus::RolledBack),
        ]
    );
    assert_eq!(block.rollbacks.load(Ordering::SeqCst), 1);

    // Re-running with identical inputs on a fresh executor yields the same
    // record sequence modulo timestamps and ids.
    let block2 = CountingExecutor::new(RemediationAction::BlockSourceIp, false);
    let quarantine2 = CountingExecutor::new(RemediationAction::QuarantineNode, true);
    let fresh = RemediationExecutor::new(vec![block2, quarantine2]);
    let replay = fresh.execute_playbook(&playbook, "threat-1").await;
    let replay_sequence: Vec<(RemediationAction, ActionStatus)> = replay
        .records
        .iter()
        .map(|r| (r.action, r.status))
        .collect();
    assert_eq!(sequence, replay_sequence);
}

#[tokio::test]
async fn incident_lifecycle_progresses_to_post_mortem() {
    let notifier = Arc::new(MemoryNotificationSender::new());
    let orchestrator = WorkflowOrchestrator::new(
        RemediationExecutor::new(vec![]),
        PlaybookRegistry::with_defaults(),
        Arc::new(EventBus::from_config()),
        vec![notifier as Arc<dyn NotificationSender>],
    );

    // Low confidence: no auto-remediation, but an incident is opened.
    let result = orchestrator
        .handle_threat(signal("fp-lifecycle", 0.5, "dos_attack"))
        .await;
    let incident = result.incident.unwrap();

    let incidents = orchestrator.incidents();
    for status in [
        IncidentStatus::Investigating,
        IncidentStatus::Contained,
        IncidentStatus::Eradicated,
        IncidentStatus::Recovering,
        IncidentStatus::Resolved,
        IncidentStatus::PostMortem,
    ] {
        incidents
            .transition(&incident.id, status, "drill")
            .expect("forward transition");
    }
    let closed = incidents.get(&incident.id).unwrap();
    assert_eq!(closed.status, IncidentStatus::PostMortem);
    assert!(closed.post_mortem.is_some());

    // Backwards movement stays rejected after closure.
    assert!(incidents
        .transition(&incident.id, IncidentStatus::Detected, "regress")
        .is_err());
}

#[tokio::test]
async fn workflow_statistics_track_outcomes() {
    let notifier = Arc::new(MemoryNotificationSender::new());
    let orchestrator = WorkflowOrchestrator::new(
        RemediationExecutor::new(vec![]),
        PlaybookRegistry::with_defaults(),
        Arc::new(EventBus::from_config()),
        vec![notifier as Arc<dyn NotificationSender>],
    );

    orchestrator
        .handle_threat(signal("fp-s1", 0.5, "port_scan"))
        .await;
    orchestrator
        .handle_threat(signal("fp-s1", 0.5, "port_scan"))
        .await;

    let stats = orchestrator.stats();
    assert_eq!(stats.executed, 2);
    assert_eq!(stats.suppressed, 1);
}
