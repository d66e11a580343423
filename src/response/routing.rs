//! Alert Router — priority-ordered rule matching, escalation, suppression
//!
//! Routes are evaluated in descending declared priority; the first rule
//! whose condition matches wins. When nothing matches, a default map keyed
//! by risk level assigns teams and escalation. A suppression filter
//! short-circuits the pipeline for repeated fingerprints and noisy
//! (threat_type, source) pairs, and the escalation manager advances open
//! records on a periodic sweep. Route tables swap atomically so readers
//! always observe a stable snapshot.

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::identity;
use crate::types::{
    AlertNotification, AlertRoute, EscalationLevel, RiskLevel, RoutedAlert, Severity,
    ThreatAssessment, ThreatSignal,
};

// ============================================================================
// Router
// ============================================================================

/// Priority-ordered alert router with a swappable route table.
pub struct AlertRouter {
    routes: ArcSwap<Vec<AlertRoute>>,
}

impl AlertRouter {
    pub fn new(mut routes: Vec<AlertRoute>) -> Self {
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            routes: ArcSwap::from_pointee(routes),
        }
    }

    /// Atomically replace the route table (copy-on-update).
    pub fn load_routes(&self, mut routes: Vec<AlertRoute>) {
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));
        info!(routes = routes.len(), "Alert route table swapped");
        self.routes.store(Arc::new(routes));
    }

    /// Route an assessment: first matching rule wins, otherwise the default
    /// map by risk level applies. Always yields at least one team.
    pub fn route(&self, signal: &ThreatSignal, assessment: &ThreatAssessment) -> RoutedAlert {
        let routes = self.routes.load();
        let matched = routes
            .iter()
            .find(|route| condition_matches(route, signal, assessment));

        let (teams, escalation, route_name) = match matched {
            Some(route) => (
                route.teams.clone(),
                route.escalation_level,
                route.name.clone(),
            ),
            None => {
                let (teams, escalation) = default_route(assessment.risk_level);
                (teams, escalation, "default".to_string())
            }
        };

        let notifications = build_notifications(signal, assessment, &teams, escalation);

        let mut context = BTreeMap::new();
        context.insert("threat_type".to_string(), signal.threat_type.clone());
        context.insert("source".to_string(), signal.source.clone());
        context.insert(
            "risk_score".to_string(),
            format!("{:.2}", assessment.risk_score),
        );
        context.insert("matched_route".to_string(), route_name.clone());

        debug!(
            threat_id = %signal.threat_id,
            route = %route_name,
            escalation = %escalation,
            teams = teams.len(),
            "Alert routed"
        );

        RoutedAlert {
            alert_id: identity::event_id(),
            threat_id: signal.threat_id.clone(),
            severity_level: assessment.risk_level,
            escalation_level: escalation,
            assigned_teams: teams,
            notifications,
            enriched_context: context,
            routed_at: Utc::now(),
            matched_route: route_name,
        }
    }
}

impl Default for AlertRouter {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

fn condition_matches(
    route: &AlertRoute,
    signal: &ThreatSignal,
    assessment: &ThreatAssessment,
) -> bool {
    let cond = &route.condition;
    if !cond.risk_levels.is_empty() && !cond.risk_levels.contains(&assessment.risk_level) {
        return false;
    }
    if cond
        .min_risk_score
        .is_some_and(|min| assessment.risk_score < min)
    {
        return false;
    }
    if cond
        .min_confidence
        .is_some_and(|min| assessment.confidence < min)
    {
        return false;
    }
    if !cond.threat_types.is_empty() && !cond.threat_types.contains(&signal.threat_type) {
        return false;
    }
    if let Some(pattern) = &cond.source_pattern {
        match Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(&signal.source) {
                    return false;
                }
            }
            Err(e) => {
                warn!(route = %route.name, error = %e, "Invalid route source pattern — rule skipped");
                return false;
            }
        }
    }
    true
}

/// Default team/escalation map by risk level.
fn default_route(level: RiskLevel) -> (Vec<String>, EscalationLevel) {
    match level {
        RiskLevel::Critical => (
            vec!["security-team".to_string(), "incident-response".to_string()],
            EscalationLevel::Critical,
        ),
        RiskLevel::High => (vec!["security-team".to_string()], EscalationLevel::Urgent),
        RiskLevel::Medium => (vec!["security-team".to_string()], EscalationLevel::Alert),
        RiskLevel::Low => (vec!["analysts".to_string()], EscalationLevel::Warning),
    }
}

/// One notification per (channel, team) at the escalation tier's fan-out.
fn build_notifications(
    signal: &ThreatSignal,
    assessment: &ThreatAssessment,
    teams: &[String],
    escalation: EscalationLevel,
) -> Vec<AlertNotification> {
    let severity = match assessment.risk_level {
        RiskLevel::Critical => Severity::Critical,
        RiskLevel::High => Severity::High,
        RiskLevel::Medium => Severity::Medium,
        RiskLevel::Low => Severity::Low,
    };
    let subject = format!(
        "[{}] {} from {} (risk {:.1})",
        escalation, signal.threat_type, signal.source, assessment.risk_score
    );
    let message = format!(
        "Threat {} classified {} with confidence {:.2}. Affected assets: {}.",
        signal.threat_id,
        signal.detection.classification,
        assessment.confidence,
        if signal.affected_assets.is_empty() {
            "none".to_string()
        } else {
            signal.affected_assets.join(", ")
        }
    );
    let action_items: Vec<String> = assessment
        .remediation_actions
        .iter()
        .map(|a| a.to_string())
        .collect();

    let mut notifications = Vec::new();
    for channel in escalation.channels() {
        for team in teams {
            notifications.push(AlertNotification {
                channel,
                recipient: team.clone(),
                subject: subject.clone(),
                message: message.clone(),
                severity,
                action_items: action_items.clone(),
            });
        }
    }
    notifications
}

// ============================================================================
// Suppression
// ============================================================================

/// Short-circuits the alert pipeline for repeats.
///
/// Two rules: an identical fingerprint inside the dup window, and more than
/// the configured cap of alerts for one (threat_type, source) pair inside
/// the same window. Counters are timestamp deques pruned on access, so the
/// per-pair count resets on a sliding window rather than growing for the
/// process lifetime.
pub struct SuppressionFilter {
    window: Duration,
    max_per_type_source: usize,
    recent_fingerprints: Mutex<HashMap<String, DateTime<Utc>>>,
    pair_history: Mutex<HashMap<(String, String), VecDeque<DateTime<Utc>>>>,
    suppressed_total: Mutex<u64>,
}

impl SuppressionFilter {
    pub fn new(window_seconds: u64, max_per_type_source: usize) -> Self {
        Self {
            window: Duration::seconds(window_seconds as i64),
            max_per_type_source,
            recent_fingerprints: Mutex::new(HashMap::new()),
            pair_history: Mutex::new(HashMap::new()),
            suppressed_total: Mutex::new(0),
        }
    }

    /// Build from the global configuration.
    pub fn from_config() -> Self {
        let cfg = &crate::config::get().routing;
        Self::new(
            cfg.suppression_dup_window_seconds,
            cfg.suppression_max_per_type_source,
        )
    }

    /// Whether an alert for this signal should be suppressed. Records the
    /// signal when it passes.
    pub fn should_suppress(&self, signal: &ThreatSignal) -> bool {
        self.should_suppress_at(signal, Utc::now())
    }

    /// Suppression check with an explicit "now" for deterministic tests.
    pub fn should_suppress_at(&self, signal: &ThreatSignal, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.window;

        {
            let mut fingerprints = self
                .recent_fingerprints
                .lock()
                .expect("suppression fingerprint lock poisoned");
            fingerprints.retain(|_, seen| *seen > cutoff);
            if fingerprints.contains_key(&signal.fingerprint) {
                self.count_suppressed();
                return true;
            }
            fingerprints.insert(signal.fingerprint.clone(), now);
        }

        let key = (signal.threat_type.clone(), signal.source.clone());
        let mut pairs = self
            .pair_history
            .lock()
            .expect("suppression pair lock poisoned");
        let history = pairs.entry(key).or_insert_with(VecDeque::new);
        while history.front().is_some_and(|t| *t <= cutoff) {
            history.pop_front();
        }
        if history.len() >= self.max_per_type_source {
            self.count_suppressed();
            return true;
        }
        history.push_back(now);
        false
    }

    fn count_suppressed(&self) {
        *self
            .suppressed_total
            .lock()
            .expect("suppression counter lock poisoned") += 1;
    }

    pub fn suppressed_total(&self) -> u64 {
        *self
            .suppressed_total
            .lock()
            .expect("suppression counter lock poisoned")
    }
}

// ============================================================================
// Escalation
// ============================================================================

/// Open escalation record for one routed alert.
#[derive(Debug, Clone)]
struct EscalationRecord {
    threat_id: String,
    level: EscalationLevel,
    last_advanced: DateTime<Utc>,
    advances: u32,
}

/// A single escalation advancement produced by a sweep.
#[derive(Debug, Clone)]
pub struct EscalationAdvance {
    pub threat_id: String,
    pub from: EscalationLevel,
    pub to: EscalationLevel,
}

/// Escalation policy manager. Holds an open record per alert; a periodic
/// sweep advances any record whose last step is older than the step
/// timeout, up to the configured maximum.
pub struct EscalationManager {
    step_timeout: Duration,
    max_escalation: u32,
    records: Mutex<HashMap<String, EscalationRecord>>,
}

impl EscalationManager {
    pub fn new(step_timeout_minutes: u64, max_escalation: u32) -> Self {
        Self {
            step_timeout: Duration::minutes(step_timeout_minutes as i64),
            max_escalation,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Build from the global configuration.
    pub fn from_config() -> Self {
        let cfg = &crate::config::get().routing;
        Self::new(cfg.escalation_step_timeout_minutes, cfg.max_escalation)
    }

    /// Open an escalation record for a routed alert.
    pub fn open(&self, alert: &RoutedAlert) {
        let mut records = self.records.lock().expect("escalation lock poisoned");
        records.insert(
            alert.alert_id.clone(),
            EscalationRecord {
                threat_id: alert.threat_id.clone(),
                level: alert.escalation_level,
                last_advanced: alert.routed_at,
                advances: 0,
            },
        );
    }

    /// Close the record for a resolved alert.
    pub fn resolve(&self, alert_id: &str) {
        self.records
            .lock()
            .expect("escalation lock poisoned")
            .remove(alert_id);
    }

    /// Advance stale records one level. Records that have consumed their
    /// maximum advances and aged past another step timeout are retired.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<EscalationAdvance> {
        let mut records = self.records.lock().expect("escalation lock poisoned");
        let mut advances = Vec::new();
        let mut retired = Vec::new();

        for (alert_id, record) in records.iter_mut() {
            if now - record.last_advanced < self.step_timeout {
                continue;
            }
            if record.advances >= self.max_escalation {
                retired.push(alert_id.clone());
                continue;
            }
            let from = record.level;
            record.level = record.level.escalate();
            record.last_advanced = now;
            record.advances += 1;
            if record.level != from {
                info!(
                    threat_id = %record.threat_id,
                    from = %from,
                    to = %record.level,
                    "Escalation advanced"
                );
                advances.push(EscalationAdvance {
                    threat_id: record.threat_id.clone(),
                    from,
                    to: record.level,
                });
            }
        }
        for alert_id in retired {
            records.remove(&alert_id);
        }
        advances
    }

    /// Open records count.
    pub fn open_count(&self) -> usize {
        self.records.lock().expect("escalation lock poisoned").len()
    }

    /// Periodic escalation sweep. Run from `tokio::spawn`.
    pub async fn run_sweep_loop(self: Arc<Self>, cancel: CancellationToken) {
        let sweep_seconds = crate::config::get().routing.escalation_sweep_seconds;
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(sweep_seconds.max(1)));
        info!(interval_secs = sweep_seconds, "Escalation sweep started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Escalation sweep stopped");
                    return;
                }
                _ = interval.tick() => {
                    let advanced = self.sweep(Utc::now());
                    if !advanced.is_empty() {
                        info!(advanced = advanced.len(), "Escalation sweep advanced records");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DetectionResult, RouteCondition, ThreatClassification};

    fn signal(threat_type: &str, source: &str, fingerprint: &str) -> ThreatSignal {
        ThreatSignal {
            threat_id: format!("threat-{fingerprint}"),
            timestamp: Utc::now(),
            source: source.to_string(),
            threat_type: threat_type.to_string(),
            fingerprint: fingerprint.to_string(),
            affected_assets: vec!["node-1".to_string()],
            detection: DetectionResult {
                threat_detected: true,
                classification: ThreatClassification::Critical,
                confidence: 0.9,
                score: 90.0,
                primary_type: threat_type.to_string(),
                contributing_models: BTreeMap::new(),
                features_triggered: vec![],
                recommendation: String::new(),
                timestamp: Utc::now(),
            },
            factors: None,
        }
    }

    fn assessment(level: RiskLevel, score: f64) -> ThreatAssessment {
        ThreatAssessment {
            threat_id: "threat-1".to_string(),
            risk_score: score,
            risk_level: level,
            confidence: 0.9,
            impact_score: 0.5,
            affected_assets: vec!["node-1".to_string()],
            attack_vector: crate::types::AttackVector::Network,
            exploitability: 0.8,
            should_auto_remediate: false,
            remediation_actions: vec![],
            context_factors: vec![],
            assessed_at: Utc::now(),
        }
    }

    #[test]
    fn highest_priority_matching_route_wins() {
        let router = AlertRouter::new(vec![
            AlertRoute {
                name: "catch-all".to_string(),
                priority: 1,
                condition: RouteCondition::default(),
                teams: vec!["analysts".to_string()],
                escalation_level: EscalationLevel::Info,
            },
            AlertRoute {
                name: "critical-fast-path".to_string(),
                priority: 100,
                condition: RouteCondition {
                    risk_levels: vec![RiskLevel::Critical],
                    ..RouteCondition::default()
                },
                teams: vec!["incident-response".to_string()],
                escalation_level: EscalationLevel::Critical,
            },
        ]);

        let alert = router.route(
            &signal("port_scan", "sensor-1", "fp-1"),
            &assessment(RiskLevel::Critical, 9.5),
        );
        assert_eq!(alert.matched_route, "critical-fast-path");
        assert_eq!(alert.assigned_teams, vec!["incident-response"]);
    }

    #[test]
    fn default_map_applies_when_nothing_matches() {
        let router = AlertRouter::default();

        let critical = router.route(
            &signal("port_scan", "s", "fp-1"),
            &assessment(RiskLevel::Critical, 9.5),
        );
        assert_eq!(
            critical.assigned_teams,
            vec!["security-team", "incident-response"]
        );
        assert_eq!(critical.escalation_level, EscalationLevel::Critical);

        let high = router.route(
            &signal("port_scan", "s", "fp-2"),
            &assessment(RiskLevel::High, 7.5),
        );
        assert_eq!(high.assigned_teams, vec!["security-team"]);
        assert_eq!(high.escalation_level, EscalationLevel::Urgent);

        let low = router.route(
            &signal("port_scan", "s", "fp-3"),
            &assessment(RiskLevel::Low, 2.0),
        );
        assert_eq!(low.assigned_teams, vec!["analysts"]);
        assert_eq!(low.escalation_level, EscalationLevel::Warning);
        assert!(!low.assigned_teams.is_empty());
    }

    #[test]
    fn source_pattern_condition_uses_regex() {
        let router = AlertRouter::new(vec![AlertRoute {
            name: "edge-sensors".to_string(),
            priority: 10,
            condition: RouteCondition {
                source_pattern: Some("^edge-".to_string()),
                ..RouteCondition::default()
            },
            teams: vec!["edge-team".to_string()],
            escalation_level: EscalationLevel::Alert,
        }]);

        let matched = router.route(
            &signal("port_scan", "edge-7", "fp-1"),
            &assessment(RiskLevel::Medium, 5.0),
        );
        assert_eq!(matched.matched_route, "edge-sensors");

        let unmatched = router.route(
            &signal("port_scan", "core-7", "fp-2"),
            &assessment(RiskLevel::Medium, 5.0),
        );
        assert_eq!(unmatched.matched_route, "default");
    }

    #[test]
    fn critical_fanout_includes_all_channels() {
        let router = AlertRouter::default();
        let alert = router.route(
            &signal("port_scan", "s", "fp-1"),
            &assessment(RiskLevel::Critical, 9.5),
        );
        let channels: std::collections::HashSet<_> = alert
            .notifications
            .iter()
            .map(|n| n.channel)
            .collect();
        assert_eq!(channels.len(), 5);
    }

    #[test]
    fn duplicate_fingerprint_is_suppressed_within_window() {
        let filter = SuppressionFilter::new(300, 10);
        let s = signal("port_scan", "sensor-1", "fp-dup");
        assert!(!filter.should_suppress(&s));
        assert!(filter.should_suppress(&s));
        assert_eq!(filter.suppressed_total(), 1);
    }

    #[test]
    fn pair_counter_resets_on_sliding_window() {
        let filter = SuppressionFilter::new(300, 3);
        let t0 = Utc::now();
        for i in 0..3 {
            let s = signal("port_scan", "sensor-1", &format!("fp-{i}"));
            assert!(!filter.should_suppress_at(&s, t0));
        }
        // Fourth alert for the same pair inside the window is suppressed.
        let s = signal("port_scan", "sensor-1", "fp-3");
        assert!(filter.should_suppress_at(&s, t0));

        // After the window slides past, the counter has reset.
        let s = signal("port_scan", "sensor-1", "fp-4");
        assert!(!filter.should_suppress_at(&s, t0 + Duration::seconds(301)));
    }

    #[test]
    fn stale_escalations_advance_one_level_up_to_max() {
        let manager = EscalationManager::new(30, 2);
        let router = AlertRouter::default();
        let alert = router.route(
            &signal("port_scan", "s", "fp-1"),
            &assessment(RiskLevel::Medium, 5.0),
        );
        manager.open(&alert);

        let now = alert.routed_at;
        // Not stale yet.
        assert!(manager.sweep(now + Duration::minutes(10)).is_empty());

        // First advance: ALERT -> URGENT.
        let advanced = manager.sweep(now + Duration::minutes(31));
        assert_eq!(advanced.len(), 1);
        assert_eq!(advanced[0].to, EscalationLevel::Urgent);

        // Second advance: URGENT -> CRITICAL.
        let advanced = manager.sweep(now + Duration::minutes(62));
        assert_eq!(advanced[0].to, EscalationLevel::Critical);

        // Max reached: the stale record retires instead of advancing.
        assert!(manager.sweep(now + Duration::minutes(93)).is_empty());
        assert_eq!(manager.open_count(), 0);
    }
}
