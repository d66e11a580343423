//! Response-stage types: alert routing and escalation, remediation playbooks
//! with reversible steps and audit records, and the incident lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::assessment::RiskLevel;
use super::event::Severity;

// ============================================================================
// Alert Routing
// ============================================================================

/// Escalation tiers controlling notification channel fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EscalationLevel {
    Info,
    Warning,
    Alert,
    Urgent,
    Critical,
}

impl EscalationLevel {
    /// Advance one tier, saturating at CRITICAL.
    pub fn escalate(self) -> Self {
        match self {
            EscalationLevel::Info => EscalationLevel::Warning,
            EscalationLevel::Warning => EscalationLevel::Alert,
            EscalationLevel::Alert => EscalationLevel::Urgent,
            EscalationLevel::Urgent => EscalationLevel::Critical,
            EscalationLevel::Critical => EscalationLevel::Critical,
        }
    }

    /// Channels notified at this tier. Higher tiers add channels on top of
    /// the lower ones; CRITICAL reaches every channel including SMS.
    pub fn channels(&self) -> Vec<NotificationChannel> {
        match self {
            EscalationLevel::Info => vec![NotificationChannel::Dashboard],
            EscalationLevel::Warning => {
                vec![NotificationChannel::Dashboard, NotificationChannel::Email]
            }
            EscalationLevel::Alert => vec![
                NotificationChannel::Dashboard,
                NotificationChannel::Email,
                NotificationChannel::Slack,
            ],
            EscalationLevel::Urgent => vec![
                NotificationChannel::Dashboard,
                NotificationChannel::Email,
                NotificationChannel::Slack,
                NotificationChannel::PagerDuty,
            ],
            EscalationLevel::Critical => vec![
                NotificationChannel::Dashboard,
                NotificationChannel::Email,
                NotificationChannel::Slack,
                NotificationChannel::PagerDuty,
                NotificationChannel::Sms,
            ],
        }
    }
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscalationLevel::Info => write!(f, "INFO"),
            EscalationLevel::Warning => write!(f, "WARNING"),
            EscalationLevel::Alert => write!(f, "ALERT"),
            EscalationLevel::Urgent => write!(f, "URGENT"),
            EscalationLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Outbound notification channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Dashboard,
    Email,
    Slack,
    PagerDuty,
    Sms,
    Syslog,
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationChannel::Dashboard => write!(f, "dashboard"),
            NotificationChannel::Email => write!(f, "email"),
            NotificationChannel::Slack => write!(f, "slack"),
            NotificationChannel::PagerDuty => write!(f, "pagerduty"),
            NotificationChannel::Sms => write!(f, "sms"),
            NotificationChannel::Syslog => write!(f, "syslog"),
        }
    }
}

/// Match predicate on a routing rule. All populated fields must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteCondition {
    /// Risk levels the rule applies to (empty = any)
    #[serde(default)]
    pub risk_levels: Vec<RiskLevel>,
    /// Minimum risk score
    pub min_risk_score: Option<f64>,
    /// Minimum assessment confidence
    pub min_confidence: Option<f64>,
    /// Threat types the rule applies to (empty = any)
    #[serde(default)]
    pub threat_types: Vec<String>,
    /// Regex matched against the threat source
    pub source_pattern: Option<String>,
}

/// Priority-ordered alert routing rule. First match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRoute {
    pub name: String,
    /// Rules are evaluated in descending priority order
    pub priority: i32,
    pub condition: RouteCondition,
    pub teams: Vec<String>,
    pub escalation_level: EscalationLevel,
}

/// One notification to dispatch over a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotification {
    pub channel: NotificationChannel,
    pub recipient: String,
    pub subject: String,
    pub message: String,
    pub severity: Severity,
    pub action_items: Vec<String>,
}

/// Fully routed alert ready for notification dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedAlert {
    pub alert_id: String,
    pub threat_id: String,
    pub severity_level: RiskLevel,
    pub escalation_level: EscalationLevel,
    /// Never empty: the default map always yields at least one team
    pub assigned_teams: Vec<String>,
    pub notifications: Vec<AlertNotification>,
    /// Routing context recorded for the audit trail
    pub enriched_context: BTreeMap<String, String>,
    pub routed_at: DateTime<Utc>,
    /// Name of the matched route, or `default` when the fallback map applied
    pub matched_route: String,
}

// ============================================================================
// Remediation
// ============================================================================

/// Reversible remediation action kinds. The underlying effect lives behind
/// the executor contract; the core requires only idempotent rollback given
/// the original execution result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    BlockSourceIp,
    QuarantineNode,
    IsolateTunnel,
    ApplyRateLimit,
    ResetSession,
    EnableDeepInspection,
    RotateCredentials,
    DisableService,
    IncreaseMonitoring,
    CollectEvidence,
}

impl RemediationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationAction::BlockSourceIp => "block_source_ip",
            RemediationAction::QuarantineNode => "quarantine_node",
            RemediationAction::IsolateTunnel => "isolate_tunnel",
            RemediationAction::ApplyRateLimit => "apply_rate_limit",
            RemediationAction::ResetSession => "reset_session",
            RemediationAction::EnableDeepInspection => "enable_deep_inspection",
            RemediationAction::RotateCredentials => "rotate_credentials",
            RemediationAction::DisableService => "disable_service",
            RemediationAction::IncreaseMonitoring => "increase_monitoring",
            RemediationAction::CollectEvidence => "collect_evidence",
        }
    }
}

impl std::fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One step of a remediation playbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationStep {
    pub action: RemediationAction,
    /// Target of the action (IP, node id, tunnel id, service name)
    pub target: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Steps execute in descending priority order
    pub priority: i32,
    /// A failed required step stops the playbook
    pub required: bool,
    /// Roll back all completed steps (reverse order) when this step fails
    pub rollback_on_failure: bool,
    /// Per-step timeout override (seconds)
    pub timeout_seconds: Option<u64>,
}

/// Ordered list of remediation steps for a class of threats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationPlaybook {
    pub playbook_id: String,
    pub name: String,
    /// Threat types this playbook applies to
    pub threat_types: Vec<String>,
    pub steps: Vec<RemediationStep>,
}

/// Per-action audit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionStatus {
    Completed,
    Failed,
    TimedOut,
    RolledBack,
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionStatus::Completed => write!(f, "COMPLETED"),
            ActionStatus::Failed => write!(f, "FAILED"),
            ActionStatus::TimedOut => write!(f, "TIMED_OUT"),
            ActionStatus::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

/// Append-only audit row recorded for every executed or rolled-back action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub execution_id: String,
    pub action: RemediationAction,
    pub target: String,
    pub status: ActionStatus,
    /// Executor result payload, used as the rollback token
    pub result: Option<serde_json::Value>,
    pub executed_at: DateTime<Utc>,
    pub reversible: bool,
    /// For ROLLED_BACK rows: the record this rollback reverses
    pub rollback_ref: Option<String>,
}

/// Terminal status of a playbook execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    RolledBack,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Completed => write!(f, "COMPLETED"),
            ExecutionStatus::Failed => write!(f, "FAILED"),
            ExecutionStatus::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

/// Full record of a playbook execution, never mutated after its terminal
/// status is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationExecution {
    pub execution_id: String,
    pub playbook_id: String,
    pub threat_id: String,
    pub status: ExecutionStatus,
    /// Audit rows in execution order (rollback rows appended after)
    pub records: Vec<ActionRecord>,
    /// Actions that completed, in execution order
    pub executed_steps: Vec<String>,
    /// Actions rolled back, in rollback (reverse) order
    pub rolled_back_steps: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

// ============================================================================
// Incidents
// ============================================================================

/// Incident severity, SEV1 most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IncidentSeverity {
    Sev1,
    Sev2,
    Sev3,
    Sev4,
}

impl IncidentSeverity {
    /// Map a risk level onto an incident severity.
    pub fn from_risk_level(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Critical => IncidentSeverity::Sev1,
            RiskLevel::High => IncidentSeverity::Sev2,
            RiskLevel::Medium => IncidentSeverity::Sev3,
            RiskLevel::Low => IncidentSeverity::Sev4,
        }
    }
}

impl std::fmt::Display for IncidentSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentSeverity::Sev1 => write!(f, "SEV1"),
            IncidentSeverity::Sev2 => write!(f, "SEV2"),
            IncidentSeverity::Sev3 => write!(f, "SEV3"),
            IncidentSeverity::Sev4 => write!(f, "SEV4"),
        }
    }
}

/// Incident lifecycle states. Transitions are forward-only; POST_MORTEM is
/// reachable only from RESOLVED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IncidentStatus {
    Detected,
    Investigating,
    Contained,
    Eradicated,
    Recovering,
    Resolved,
    PostMortem,
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentStatus::Detected => write!(f, "DETECTED"),
            IncidentStatus::Investigating => write!(f, "INVESTIGATING"),
            IncidentStatus::Contained => write!(f, "CONTAINED"),
            IncidentStatus::Eradicated => write!(f, "ERADICATED"),
            IncidentStatus::Recovering => write!(f, "RECOVERING"),
            IncidentStatus::Resolved => write!(f, "RESOLVED"),
            IncidentStatus::PostMortem => write!(f, "POST_MORTEM"),
        }
    }
}

/// Reference to a collected forensic artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicEvidence {
    pub evidence_id: String,
    pub kind: String,
    pub description: String,
    pub collected_at: DateTime<Utc>,
}

/// One entry in an incident's status timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: IncidentStatus,
    pub to: IncidentStatus,
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// Security incident tracked through its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub threat_id: String,
    pub severity: IncidentSeverity,
    pub status: IncidentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub affected_systems: Vec<String>,
    pub affected_users: Vec<String>,
    pub response_team: Vec<String>,
    pub forensic_evidence: Vec<ForensicEvidence>,
    /// Execution ids of remediation runs tied to this incident
    pub remediation_refs: Vec<String>,
    pub timeline: Vec<StatusTransition>,
    /// Summary generated when the incident reaches POST_MORTEM
    pub post_mortem: Option<String>,
}
