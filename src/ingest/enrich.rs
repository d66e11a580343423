//! Enricher — attaches severity, correlations, and threat-intel context
//!
//! Enrichment is deterministic given the event and the current recent-window
//! snapshot: severity comes from the payload threat score, context from the
//! swappable intel table, and correlations from a bounded scan of recent
//! events sharing a source or kind.

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::config::defaults::CORRELATION_BUFFER_SIZE;
use crate::identity;
use crate::types::{
    EnrichedEvent, Enrichment, EventKind, PatternSummary, RawEvent, Severity, SourceReputation,
    ThreatContext,
};

/// One entry of the static threat-intel context table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatIntelEntry {
    pub description: String,
    pub previous_incidents: u64,
}

/// Threat-intel table keyed by threat type. Loaded at startup, swapped
/// atomically on reload; readers always observe a stable snapshot.
pub type ThreatIntelTable = BTreeMap<String, ThreatIntelEntry>;

/// Recent-event record kept for correlation scans.
#[derive(Debug, Clone)]
struct RecentEvent {
    at: DateTime<Utc>,
    source: String,
    kind: EventKind,
    fingerprint: String,
}

/// Event enricher.
pub struct Enricher {
    intel: ArcSwap<ThreatIntelTable>,
    recent: Mutex<VecDeque<RecentEvent>>,
    /// Per-source event counters feeding the reputation snapshot
    source_counts: Mutex<HashMap<String, u64>>,
    correlation_window: Duration,
    correlation_cap: usize,
    enriched_total: AtomicU64,
}

/// Point-in-time enrichment statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EnricherStats {
    pub enriched_total: u64,
    pub recent_window_size: usize,
    pub known_threat_types: usize,
}

impl Enricher {
    pub fn new(correlation_window_seconds: u64, correlation_cap: usize) -> Self {
        Self {
            intel: ArcSwap::from_pointee(ThreatIntelTable::new()),
            recent: Mutex::new(VecDeque::new()),
            source_counts: Mutex::new(HashMap::new()),
            correlation_window: Duration::seconds(correlation_window_seconds as i64),
            correlation_cap,
            enriched_total: AtomicU64::new(0),
        }
    }

    /// Build from the global configuration.
    pub fn from_config() -> Self {
        let cfg = &crate::config::get().ingest;
        Self::new(cfg.correlation_window_seconds, cfg.correlation_cap)
    }

    /// Atomically replace the threat-intel table.
    pub fn load_intel_table(&self, table: ThreatIntelTable) {
        debug!(entries = table.len(), "Threat-intel table swapped");
        self.intel.store(Arc::new(table));
    }

    /// Upgrade a raw event to an enriched event. Called exactly once per
    /// accepted (non-duplicate) event.
    pub fn enrich(&self, event: &RawEvent) -> EnrichedEvent {
        let fingerprint = identity::fingerprint(event);
        let severity = determine_severity(event);
        let threat_context = self.threat_context(event);

        let (correlations, patterns) = self.scan_recent(event, &fingerprint);
        let reputation = self.source_reputation(&event.source);

        self.enriched_total.fetch_add(1, Ordering::Relaxed);

        EnrichedEvent {
            timestamp: event.timestamp,
            source: event.source.clone(),
            kind: event.kind,
            severity,
            payload: event.payload.clone(),
            metadata: event.metadata.clone(),
            enrichment: Enrichment {
                threat_context,
                source_reputation: reputation,
                historical_patterns: patterns,
            },
            correlations,
            original_hash: fingerprint,
            processed_at: Utc::now(),
        }
    }

    /// Intel context for the event's threat type.
    fn threat_context(&self, event: &RawEvent) -> ThreatContext {
        let threat_type = event.threat_type().unwrap_or("unknown");
        let table = self.intel.load();
        match table.get(threat_type) {
            Some(entry) => ThreatContext {
                threat_type: threat_type.to_string(),
                known: true,
                previous_incidents: entry.previous_incidents,
                description: Some(entry.description.clone()),
            },
            None => ThreatContext::unknown(threat_type),
        }
    }

    /// Correlate against the recent window and record this event into it.
    ///
    /// Returns (correlated fingerprints capped at the configured limit,
    /// pattern summary counts over the same window).
    fn scan_recent(&self, event: &RawEvent, fingerprint: &str) -> (Vec<String>, PatternSummary) {
        let mut recent = self.recent.lock().expect("recent-event lock poisoned");

        // Prune entries past the correlation window.
        let cutoff = event.timestamp - self.correlation_window;
        while recent.front().is_some_and(|e| e.at < cutoff) {
            recent.pop_front();
        }

        let mut correlations = Vec::new();
        let mut from_source = 0usize;
        let mut of_kind = 0usize;
        for entry in recent.iter() {
            let source_match = entry.source == event.source;
            let kind_match = entry.kind == event.kind;
            if source_match {
                from_source += 1;
            }
            if kind_match {
                of_kind += 1;
            }
            if (source_match || kind_match) && correlations.len() < self.correlation_cap {
                correlations.push(entry.fingerprint.clone());
            }
        }

        recent.push_back(RecentEvent {
            at: event.timestamp,
            source: event.source.clone(),
            kind: event.kind,
            fingerprint: fingerprint.to_string(),
        });
        if recent.len() > CORRELATION_BUFFER_SIZE {
            recent.pop_front();
        }

        (
            correlations,
            PatternSummary {
                recent_from_source: from_source,
                recent_of_kind: of_kind,
            },
        )
    }

    /// Reputation snapshot for a source, bumping its event counter.
    fn source_reputation(&self, source: &str) -> SourceReputation {
        let mut counts = self.source_counts.lock().expect("source-count lock poisoned");
        let seen = counts.entry(source.to_string()).or_insert(0);
        let previous = *seen;
        *seen += 1;
        SourceReputation {
            source: source.to_string(),
            trust_score: 0.95,
            previous_events: previous,
        }
    }

    pub fn stats(&self) -> EnricherStats {
        EnricherStats {
            enriched_total: self.enriched_total.load(Ordering::Relaxed),
            recent_window_size: self.recent.lock().expect("recent-event lock poisoned").len(),
            known_threat_types: self.intel.load().len(),
        }
    }
}

/// Severity from the payload threat score: 0.8→CRITICAL, 0.6→HIGH,
/// 0.4→MEDIUM, else LOW; non-threat kinds default to INFO.
fn determine_severity(event: &RawEvent) -> Severity {
    if event.kind != EventKind::ThreatDetection {
        return Severity::Info;
    }
    let score = event.threat_score().unwrap_or(0.0);
    if score > 0.8 {
        Severity::Critical
    } else if score > 0.6 {
        Severity::High
    } else if score > 0.4 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn threat_event(ts_offset: i64, source: &str, score: f64) -> RawEvent {
        let mut payload = BTreeMap::new();
        payload.insert("threat_score".to_string(), json!(score));
        payload.insert("threat_type".to_string(), json!("port_scan"));
        RawEvent {
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
                + Duration::seconds(ts_offset),
            source: source.to_string(),
            kind: EventKind::ThreatDetection,
            payload,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn severity_thresholds_follow_threat_score() {
        assert_eq!(determine_severity(&threat_event(0, "s", 0.9)), Severity::Critical);
        assert_eq!(determine_severity(&threat_event(0, "s", 0.7)), Severity::High);
        assert_eq!(determine_severity(&threat_event(0, "s", 0.5)), Severity::Medium);
        assert_eq!(determine_severity(&threat_event(0, "s", 0.1)), Severity::Low);

        let mut metric = threat_event(0, "s", 0.9);
        metric.kind = EventKind::NetworkMetric;
        assert_eq!(determine_severity(&metric), Severity::Info);
    }

    #[test]
    fn enrichment_copies_fingerprint_into_original_hash() {
        let enricher = Enricher::new(300, 10);
        let event = threat_event(0, "sensor-1", 0.9);
        let enriched = enricher.enrich(&event);
        assert_eq!(enriched.original_hash, identity::fingerprint(&event));
        assert_eq!(enriched.severity, Severity::Critical);
    }

    #[test]
    fn correlations_match_source_or_kind_and_respect_cap() {
        let enricher = Enricher::new(300, 3);
        for i in 0..6 {
            enricher.enrich(&threat_event(i, "sensor-1", 0.5));
        }
        let enriched = enricher.enrich(&threat_event(10, "sensor-1", 0.6));
        assert_eq!(enriched.correlations.len(), 3);
        assert_eq!(enriched.enrichment.historical_patterns.recent_from_source, 6);
    }

    #[test]
    fn events_outside_window_are_not_correlated() {
        let enricher = Enricher::new(300, 10);
        enricher.enrich(&threat_event(0, "sensor-1", 0.5));
        let enriched = enricher.enrich(&threat_event(1_000, "sensor-1", 0.5));
        assert!(enriched.correlations.is_empty());
    }

    #[test]
    fn intel_table_lookup_marks_known_types() {
        let enricher = Enricher::new(300, 10);
        let mut table = ThreatIntelTable::new();
        table.insert(
            "port_scan".to_string(),
            ThreatIntelEntry {
                description: "sequential connection probing".to_string(),
                previous_incidents: 12,
            },
        );
        enricher.load_intel_table(table);

        let enriched = enricher.enrich(&threat_event(0, "sensor-1", 0.9));
        assert!(enriched.enrichment.threat_context.known);
        assert_eq!(enriched.enrichment.threat_context.previous_incidents, 12);
    }
}
