//! Incident Manager — forward-only lifecycle state machine with forensics
//!
//! Incidents progress DETECTED → INVESTIGATING → CONTAINED → ERADICATED →
//! RECOVERING → RESOLVED, with POST_MORTEM reachable only from RESOLVED.
//! A backwards transition is an invariant violation: it is logged at error
//! severity, the operation aborts, and the incident is left untouched.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{error, info};

use crate::identity;
use crate::types::{
    ForensicEvidence, Incident, IncidentSeverity, IncidentStatus, StatusTransition,
};

/// Incident lifecycle errors.
#[derive(Debug, Error)]
pub enum IncidentError {
    #[error("incident not found: {0}")]
    NotFound(String),

    #[error("invalid status transition {from} -> {to} for incident {id}")]
    InvalidTransition {
        id: String,
        from: IncidentStatus,
        to: IncidentStatus,
    },
}

/// In-memory incident store and lifecycle driver.
pub struct IncidentManager {
    incidents: Mutex<HashMap<String, Incident>>,
}

impl IncidentManager {
    pub fn new() -> Self {
        Self {
            incidents: Mutex::new(HashMap::new()),
        }
    }

    /// Create an incident in DETECTED for a threat.
    pub fn create_incident(
        &self,
        threat_id: &str,
        severity: IncidentSeverity,
        affected_systems: Vec<String>,
        response_team: Vec<String>,
    ) -> Incident {
        let now = Utc::now();
        let incident = Incident {
            id: identity::event_id(),
            threat_id: threat_id.to_string(),
            severity,
            status: IncidentStatus::Detected,
            created_at: now,
            updated_at: now,
            affected_systems,
            affected_users: Vec::new(),
            response_team,
            forensic_evidence: Vec::new(),
            remediation_refs: Vec::new(),
            timeline: Vec::new(),
            post_mortem: None,
        };
        info!(
            incident_id = %incident.id,
            threat_id = threat_id,
            severity = %severity,
            "Incident created"
        );
        self.incidents
            .lock()
            .expect("incident store lock poisoned")
            .insert(incident.id.clone(), incident.clone());
        incident
    }

    /// Advance an incident's status. Only forward transitions are legal;
    /// POST_MORTEM requires RESOLVED.
    pub fn transition(
        &self,
        incident_id: &str,
        to: IncidentStatus,
        reason: &str,
    ) -> Result<Incident, IncidentError> {
        let mut incidents = self.incidents.lock().expect("incident store lock poisoned");
        let incident = incidents
            .get_mut(incident_id)
            .ok_or_else(|| IncidentError::NotFound(incident_id.to_string()))?;

        if !is_valid_transition(incident.status, to) {
            error!(
                incident_id = incident_id,
                from = %incident.status,
                to = %to,
                "Invalid incident transition — aborting"
            );
            return Err(IncidentError::InvalidTransition {
                id: incident_id.to_string(),
                from: incident.status,
                to,
            });
        }

        let from = incident.status;
        incident.status = to;
        incident.updated_at = Utc::now();
        incident.timeline.push(StatusTransition {
            from,
            to,
            at: incident.updated_at,
            reason: reason.to_string(),
        });
        if to == IncidentStatus::PostMortem {
            incident.post_mortem = Some(post_mortem_summary(incident));
        }
        info!(
            incident_id = incident_id,
            from = %from,
            to = %to,
            reason = reason,
            "Incident transitioned"
        );
        Ok(incident.clone())
    }

    /// Attach a forensic evidence reference.
    pub fn collect_evidence(
        &self,
        incident_id: &str,
        kind: &str,
        description: &str,
    ) -> Result<ForensicEvidence, IncidentError> {
        let mut incidents = self.incidents.lock().expect("incident store lock poisoned");
        let incident = incidents
            .get_mut(incident_id)
            .ok_or_else(|| IncidentError::NotFound(incident_id.to_string()))?;
        let evidence = ForensicEvidence {
            evidence_id: identity::execution_id(),
            kind: kind.to_string(),
            description: description.to_string(),
            collected_at: Utc::now(),
        };
        incident.forensic_evidence.push(evidence.clone());
        incident.updated_at = Utc::now();
        Ok(evidence)
    }

    /// Link a remediation execution to an incident.
    pub fn attach_remediation(
        &self,
        incident_id: &str,
        execution_id: &str,
    ) -> Result<(), IncidentError> {
        let mut incidents = self.incidents.lock().expect("incident store lock poisoned");
        let incident = incidents
            .get_mut(incident_id)
            .ok_or_else(|| IncidentError::NotFound(incident_id.to_string()))?;
        incident.remediation_refs.push(execution_id.to_string());
        incident.updated_at = Utc::now();
        Ok(())
    }

    pub fn get(&self, incident_id: &str) -> Option<Incident> {
        self.incidents
            .lock()
            .expect("incident store lock poisoned")
            .get(incident_id)
            .cloned()
    }

    /// Incidents not yet resolved, newest first.
    pub fn open_incidents(&self) -> Vec<Incident> {
        let incidents = self.incidents.lock().expect("incident store lock poisoned");
        let mut open: Vec<Incident> = incidents
            .values()
            .filter(|i| i.status < IncidentStatus::Resolved)
            .cloned()
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        open
    }

    pub fn count(&self) -> usize {
        self.incidents.lock().expect("incident store lock poisoned").len()
    }
}

impl Default for IncidentManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward-only transition rules; POST_MORTEM only from RESOLVED.
fn is_valid_transition(from: IncidentStatus, to: IncidentStatus) -> bool {
    if to == IncidentStatus::PostMortem {
        return from == IncidentStatus::Resolved;
    }
    to > from
}

/// Post-mortem text generated when the incident closes out.
fn post_mortem_summary(incident: &Incident) -> String {
    let duration = incident.updated_at - incident.created_at;
    format!(
        "Incident {} ({}) affecting {} system(s) moved through {} transition(s) over {} minute(s); {} remediation execution(s), {} evidence item(s) collected.",
        incident.id,
        incident.severity,
        incident.affected_systems.len(),
        incident.timeline.len(),
        duration.num_minutes().max(0),
        incident.remediation_refs.len(),
        incident.forensic_evidence.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_incident() -> (IncidentManager, String) {
        let manager = IncidentManager::new();
        let incident = manager.create_incident(
            "threat-1",
            IncidentSeverity::Sev2,
            vec!["node-1".to_string()],
            vec!["security-team".to_string()],
        );
        (manager, incident.id)
    }

    #[test]
    fn lifecycle_progresses_forward_only() {
        let (manager, id) = manager_with_incident();
        let order = [
            IncidentStatus::Investigating,
            IncidentStatus::Contained,
            IncidentStatus::Eradicated,
            IncidentStatus::Recovering,
            IncidentStatus::Resolved,
            IncidentStatus::PostMortem,
        ];
        for status in order {
            assert!(manager.transition(&id, status, "test").is_ok(), "{status}");
        }
        let incident = manager.get(&id).unwrap();
        assert_eq!(incident.timeline.len(), 6);
        assert!(incident.post_mortem.is_some());
    }

    #[test]
    fn backwards_transition_is_rejected() {
        let (manager, id) = manager_with_incident();
        manager
            .transition(&id, IncidentStatus::Contained, "contained")
            .unwrap();
        let err = manager
            .transition(&id, IncidentStatus::Detected, "regress")
            .unwrap_err();
        assert!(matches!(err, IncidentError::InvalidTransition { .. }));
        // The incident was not modified.
        assert_eq!(manager.get(&id).unwrap().status, IncidentStatus::Contained);
    }

    #[test]
    fn post_mortem_requires_resolved() {
        let (manager, id) = manager_with_incident();
        assert!(manager
            .transition(&id, IncidentStatus::PostMortem, "too early")
            .is_err());
        for status in [
            IncidentStatus::Investigating,
            IncidentStatus::Contained,
            IncidentStatus::Eradicated,
            IncidentStatus::Recovering,
            IncidentStatus::Resolved,
        ] {
            manager.transition(&id, status, "step").unwrap();
        }
        assert!(manager
            .transition(&id, IncidentStatus::PostMortem, "closing")
            .is_ok());
    }

    #[test]
    fn skipping_intermediate_states_is_still_forward() {
        let (manager, id) = manager_with_incident();
        // DETECTED -> CONTAINED skips INVESTIGATING but moves forward.
        assert!(manager
            .transition(&id, IncidentStatus::Contained, "fast containment")
            .is_ok());
    }

    #[test]
    fn evidence_and_remediation_attach() {
        let (manager, id) = manager_with_incident();
        manager
            .collect_evidence(&id, "pcap", "captured suspicious flow")
            .unwrap();
        manager.attach_remediation(&id, "exec-1").unwrap();
        let incident = manager.get(&id).unwrap();
        assert_eq!(incident.forensic_evidence.len(), 1);
        assert_eq!(incident.remediation_refs, vec!["exec-1"]);
    }

    #[test]
    fn unknown_incident_returns_not_found() {
        let manager = IncidentManager::new();
        assert!(matches!(
            manager.transition("nope", IncidentStatus::Contained, "x"),
            Err(IncidentError::NotFound(_))
        ));
    }
}
