//! Clock & identity primitives: monotonic timestamps, sortable event ids,
//! and SHA-256 fingerprints over the canonical event encoding.
//!
//! The fingerprint is the identity used for deduplication: deterministic
//! JSON of `{timestamp_isoformat, source, kind, payload, metadata}` with
//! sorted keys, UTF-8 encoded, then SHA-256.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::types::RawEvent;

/// Monotonic wall-clock source.
///
/// Wraps `Utc::now()` but never returns a timestamp earlier than one it has
/// already handed out, so per-source event ordering survives small NTP steps.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            last_micros: AtomicI64::new(0),
        }
    }

    /// Current time, clamped to be non-decreasing across calls.
    pub fn now(&self) -> DateTime<Utc> {
        let mut candidate = Utc::now().timestamp_micros();
        let mut last = self.last_micros.load(Ordering::Acquire);
        loop {
            if candidate <= last {
                candidate = last + 1;
            }
            match self.last_micros.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => last = observed,
            }
        }
        Utc.timestamp_micros(candidate)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// Generate a sortable event id: millisecond timestamp prefix plus a random
/// suffix, so ids order roughly by creation time while staying unique.
pub fn event_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{:012x}-{}", millis, &suffix[..12])
}

/// Generate an opaque execution/change id.
pub fn execution_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Canonical JSON encoding of a raw event.
///
/// `BTreeMap` payload/metadata and serde_json's sorted object keys make the
/// encoding deterministic for identical events.
pub fn canonical_encoding(event: &RawEvent) -> String {
    let canonical = json!({
        "timestamp": event.timestamp.to_rfc3339(),
        "source": event.source,
        "kind": event.kind.as_str(),
        "payload": event.payload,
        "metadata": event.metadata,
    });
    canonical.to_string()
}

/// SHA-256 fingerprint of the canonical event encoding, hex-encoded.
pub fn fingerprint(event: &RawEvent) -> String {
    let encoded = canonical_encoding(event);
    let digest = Sha256::digest(encoded.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn sample_event() -> RawEvent {
        let mut payload = BTreeMap::new();
        payload.insert("threat_score".to_string(), json!(0.9));
        payload.insert("threat_type".to_string(), json!("port_scan"));
        RawEvent {
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            source: "sensor-1".to_string(),
            kind: EventKind::ThreatDetection,
            payload,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn identical_events_share_a_fingerprint() {
        let a = sample_event();
        let b = sample_event();
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn any_field_change_alters_the_fingerprint() {
        let base = sample_event();
        let mut other = sample_event();
        other.source = "sensor-2".to_string();
        assert_ne!(fingerprint(&base), fingerprint(&other));

        let mut other = sample_event();
        other.payload.insert("extra".to_string(), json!(1));
        assert_ne!(fingerprint(&base), fingerprint(&other));
    }

    #[test]
    fn canonical_encoding_round_trips() {
        let event = sample_event();
        let encoded = canonical_encoding(&event);
        // Re-parsing and re-serializing the canonical form must be stable.
        let parsed: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(parsed.to_string(), encoded);
    }

    #[test]
    fn monotonic_clock_never_steps_backwards() {
        let clock = MonotonicClock::new();
        let mut last = clock.now();
        for _ in 0..1_000 {
            let next = clock.now();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn event_ids_sort_by_creation_and_stay_unique() {
        let a = event_id();
        let b = event_id();
        assert_ne!(a, b);
        // The millisecond prefix orders ids across time; within the same
        // millisecond only uniqueness is guaranteed.
        assert!(a[..12] <= b[..12]);
    }
}
