//! Remediation Executor — prioritized reversible actions with rollback
//!
//! Executes a playbook's steps in descending priority order through
//! pluggable action executors. Every execution and rollback appends an
//! audit row. A failed required step stops the playbook; when the step
//! carries `rollback_on_failure`, every previously completed step rolls
//! back in reverse order. Rollback is idempotent: a record already rolled
//! back is never rolled back again.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use arc_swap::ArcSwap;

use crate::identity;
use crate::types::{
    ActionRecord, ActionStatus, ExecutionStatus, RemediationAction, RemediationExecution,
    RemediationPlaybook, RemediationStep,
};

/// Errors surfaced by action executors.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("action failed: {0}")]
    ActionFailed(String),

    #[error("no executor registered for action {0}")]
    NoExecutor(String),

    #[error("action timed out after {0:?}")]
    Timeout(Duration),

    #[error("rollback failed: {0}")]
    RollbackFailed(String),
}

/// Executor contract for one action kind. Implementations own the external
/// effect; the core requires only that `rollback` be idempotent given the
/// original `execute` result and commute with retries.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// The action kind this executor handles.
    fn action(&self) -> RemediationAction;

    /// Apply the action. The returned value is the rollback token.
    async fn execute(
        &self,
        target: &str,
        parameters: &BTreeMap<String, Value>,
    ) -> Result<Value, ExecutorError>;

    /// Reverse a prior execution given its result token.
    async fn rollback(&self, result: &Value) -> Result<(), ExecutorError>;
}

/// Playbook executor with a registered executor per action kind.
pub struct RemediationExecutor {
    executors: HashMap<RemediationAction, Arc<dyn ActionExecutor>>,
    default_timeout: Duration,
    /// Append-only audit log across executions
    audit_log: Mutex<Vec<ActionRecord>>,
    /// Rollback-idempotence guard: rollback refs already applied
    rolled_back: Mutex<HashSet<String>>,
}

impl RemediationExecutor {
    pub fn new(executors: Vec<Arc<dyn ActionExecutor>>) -> Self {
        let default_timeout =
            Duration::from_secs(crate::config::get().remediation.step_timeout_seconds);
        Self {
            executors: executors.into_iter().map(|e| (e.action(), e)).collect(),
            default_timeout,
            audit_log: Mutex::new(Vec::new()),
            rolled_back: Mutex::new(HashSet::new()),
        }
    }

    /// Execute a playbook against a threat.
    ///
    /// Steps run strictly sequentially in descending priority order; each
    /// step is bounded by its own timeout (falling back to the configured
    /// default). The returned execution is immutable once its terminal
    /// status is set.
    pub async fn execute_playbook(
        &self,
        playbook: &RemediationPlaybook,
        threat_id: &str,
    ) -> RemediationExecution {
        let execution_id = identity::execution_id();
        let started_at = Utc::now();
        info!(
            execution_id = %execution_id,
            playbook = %playbook.playbook_id,
            threat_id = threat_id,
            steps = playbook.steps.len(),
            "Remediation execution started"
        );

        let mut steps = playbook.steps.clone();
        steps.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut records = Vec::new();
        let mut executed: Vec<String> = Vec::new();
        // (step, result token, record index) for the rollback path
        let mut completed: Vec<(RemediationStep, Value, usize)> = Vec::new();
        let mut status = ExecutionStatus::Completed;

        for step in steps {
            match self.run_step(&step).await {
                Ok(result) => {
                    let record = ActionRecord {
                        execution_id: execution_id.clone(),
                        action: step.action,
                        target: step.target.clone(),
                        status: ActionStatus::Completed,
                        result: Some(result.clone()),
                        executed_at: Utc::now(),
                        reversible: true,
                        rollback_ref: None,
                    };
                    self.append_audit(record.clone());
                    let index = records.len();
                    records.push(record);
                    executed.push(step.action.as_str().to_string());
                    completed.push((step, result, index));
                }
                Err(e) => {
                    let action_status = match e {
                        ExecutorError::Timeout(_) => ActionStatus::TimedOut,
                        _ => ActionStatus::Failed,
                    };
                    warn!(
                        execution_id = %execution_id,
                        action = %step.action,
                        status = %action_status,
                        error = %e,
                        "Remediation step failed"
                    );
                    let record = ActionRecord {
                        execution_id: execution_id.clone(),
                        action: step.action,
                        target: step.target.clone(),
                        status: action_status,
                        result: None,
                        executed_at: Utc::now(),
                        reversible: false,
                        rollback_ref: None,
                    };
                    self.append_audit(record.clone());
                    records.push(record);

                    if step.required {
                        status = if step.rollback_on_failure {
                            ExecutionStatus::RolledBack
                        } else {
                            ExecutionStatus::Failed
                        };
                        break;
                    }
                    // Optional steps log the failure and continue.
                }
            }
        }

        let mut rolled_back_steps = Vec::new();
        if status == ExecutionStatus::RolledBack {
            rolled_back_steps = self
                .rollback_completed(&execution_id, &completed, &mut records)
                .await;
        }

        let execution = RemediationExecution {
            execution_id: execution_id.clone(),
            playbook_id: playbook.playbook_id.clone(),
            threat_id: threat_id.to_string(),
            status,
            records,
            executed_steps: executed,
            rolled_back_steps,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            execution_id = %execution_id,
            status = %execution.status,
            executed = execution.executed_steps.len(),
            rolled_back = execution.rolled_back_steps.len(),
            "Remediation execution finished"
        );
        execution
    }

    /// Roll back every completed step in reverse order.
    pub async fn rollback_execution(&self, execution: &RemediationExecution) -> Vec<String> {
        let completed: Vec<(RemediationStep, Value, usize)> = execution
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == ActionStatus::Completed)
            .filter_map(|(i, r)| {
                r.result.as_ref().map(|result| {
                    (
                        RemediationStep {
                            action: r.action,
                            target: r.target.clone(),
                            parameters: BTreeMap::new(),
                            priority: 0,
                            required: false,
                            rollback_on_failure: false,
                            timeout_seconds: None,
                        },
                        result.clone(),
                        i,
                    )
                })
            })
            .collect();
        let mut records = Vec::new();
        self.rollback_completed(&execution.execution_id, &completed, &mut records)
            .await
    }

    async fn rollback_completed(
        &self,
        execution_id: &str,
        completed: &[(RemediationStep, Value, usize)],
        records: &mut Vec<ActionRecord>,
    ) -> Vec<String> {
        let mut rolled_back = Vec::new();
        for (step, result, index) in completed.iter().rev() {
            let rollback_ref = format!("{execution_id}#{index}");
            {
                let mut seen = self.rolled_back.lock().expect("rollback set lock poisoned");
                if !seen.insert(rollback_ref.clone()) {
                    debug!(rollback_ref = %rollback_ref, "Rollback already applied — skipping");
                    continue;
                }
            }

            let outcome = match self.executors.get(&step.action) {
                Some(executor) => executor.rollback(result).await,
                None => Err(ExecutorError::NoExecutor(step.action.as_str().to_string())),
            };
            match outcome {
                Ok(()) => {
                    let record = ActionRecord {
                        execution_id: execution_id.to_string(),
                        action: step.action,
                        target: step.target.clone(),
                        status: ActionStatus::RolledBack,
                        result: Some(result.clone()),
                        executed_at: Utc::now(),
                        reversible: false,
                        rollback_ref: Some(rollback_ref),
                    };
                    self.append_audit(record.clone());
                    records.push(record);
                    rolled_back.push(step.action.as_str().to_string());
                }
                Err(e) => {
                    // A failed rollback is logged at critical severity; the
                    // remaining steps still attempt their own rollback.
                    error!(
                        execution_id = execution_id,
                        action = %step.action,
                        error = %e,
                        "Rollback failed — manual intervention required"
                    );
                }
            }
        }
        rolled_back
    }

    async fn run_step(&self, step: &RemediationStep) -> Result<Value, ExecutorError> {
        let executor = self
            .executors
            .get(&step.action)
            .ok_or_else(|| ExecutorError::NoExecutor(step.action.as_str().to_string()))?;
        let timeout = step
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        match tokio::time::timeout(timeout, executor.execute(&step.target, &step.parameters)).await
        {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::Timeout(timeout)),
        }
    }

    fn append_audit(&self, record: ActionRecord) {
        self.audit_log
            .lock()
            .expect("audit log lock poisoned")
            .push(record);
    }

    /// Snapshot of the append-only audit log.
    pub fn audit_log(&self) -> Vec<ActionRecord> {
        self.audit_log
            .lock()
            .expect("audit log lock poisoned")
            .clone()
    }
}

// ============================================================================
// Playbook registry
// ============================================================================

/// Playbook registry with atomic snapshot swap.
pub struct PlaybookRegistry {
    playbooks: ArcSwap<Vec<RemediationPlaybook>>,
}

impl PlaybookRegistry {
    pub fn new(playbooks: Vec<RemediationPlaybook>) -> Self {
        Self {
            playbooks: ArcSwap::from_pointee(playbooks),
        }
    }

    /// Registry pre-loaded with the standard response playbooks.
    pub fn with_defaults() -> Self {
        Self::new(default_playbooks())
    }

    /// Atomically replace the playbook set (copy-on-update).
    pub fn load_playbooks(&self, playbooks: Vec<RemediationPlaybook>) {
        info!(playbooks = playbooks.len(), "Playbook registry swapped");
        self.playbooks.store(Arc::new(playbooks));
    }

    /// Select the playbook for a threat type; falls back to the generic
    /// playbook when no specific one matches.
    pub fn select(&self, threat_type: &str) -> Option<RemediationPlaybook> {
        let playbooks = self.playbooks.load();
        playbooks
            .iter()
            .find(|p| p.threat_types.iter().any(|t| t == threat_type))
            .or_else(|| {
                playbooks
                    .iter()
                    .find(|p| p.threat_types.iter().any(|t| t == "*"))
            })
            .cloned()
    }
}

/// Standard playbooks for the common mesh threat types.
fn default_playbooks() -> Vec<RemediationPlaybook> {
    let step = |action: RemediationAction, priority: i32, required: bool| RemediationStep {
        action,
        target: String::new(),
        parameters: BTreeMap::new(),
        priority,
        required,
        rollback_on_failure: required,
        timeout_seconds: None,
    };

    vec![
        RemediationPlaybook {
            playbook_id: "port-scan-response".to_string(),
            name: "Port Scan Response".to_string(),
            threat_types: vec!["port_scan".to_string()],
            steps: vec![
                step(RemediationAction::BlockSourceIp, 100, true),
                step(RemediationAction::CollectEvidence, 50, false),
                step(RemediationAction::IncreaseMonitoring, 10, false),
            ],
        },
        RemediationPlaybook {
            playbook_id: "brute-force-response".to_string(),
            name: "Brute Force Response".to_string(),
            threat_types: vec!["ssh_brute_force".to_string(), "brute_force".to_string()],
            steps: vec![
                step(RemediationAction::BlockSourceIp, 100, true),
                step(RemediationAction::ResetSession, 80, true),
                step(RemediationAction::RotateCredentials, 60, false),
                step(RemediationAction::CollectEvidence, 20, false),
            ],
        },
        RemediationPlaybook {
            playbook_id: "dos-mitigation".to_string(),
            name: "DoS Mitigation".to_string(),
            threat_types: vec!["dos_attack".to_string()],
            steps: vec![
                step(RemediationAction::ApplyRateLimit, 100, true),
                step(RemediationAction::EnableDeepInspection, 70, false),
                step(RemediationAction::IncreaseMonitoring, 30, false),
            ],
        },
        RemediationPlaybook {
            playbook_id: "generic-response".to_string(),
            name: "Generic Response".to_string(),
            threat_types: vec!["*".to_string()],
            steps: vec![
                step(RemediationAction::IncreaseMonitoring, 100, true),
                step(RemediationAction::CollectEvidence, 50, false),
            ],
        },
    ]
}
