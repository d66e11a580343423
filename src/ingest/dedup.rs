//! Deduplicator — TTL-indexed fingerprint set with partitioned locking
//!
//! Rejects events whose fingerprint was already seen inside the dedup
//! window. Entries expire lazily on access and eagerly once the set grows
//! past its configured bound. Concurrent calls are serialized per partition;
//! the partition is the first byte of the fingerprint digest, so unrelated
//! fingerprints never contend on the same lock.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::warn;

use crate::identity;
use crate::types::RawEvent;

/// Number of lock partitions (one per possible first digest byte).
const PARTITIONS: usize = 256;

/// Fingerprint entries for one partition.
#[derive(Debug, Default)]
struct Partition {
    /// fingerprint -> first-seen time
    entries: HashMap<String, DateTime<Utc>>,
}

/// Sliding-window event deduplicator.
pub struct Deduplicator {
    partitions: Vec<Mutex<Partition>>,
    window: Duration,
    max_entries: usize,
    /// Total entries across partitions
    active: AtomicUsize,
    processed: AtomicU64,
    duplicates: AtomicU64,
    /// Times the oldest-half drop path ran because every entry was fresh
    pressure_events: AtomicU64,
}

/// Point-in-time deduplication statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DedupStats {
    pub processed_total: u64,
    pub duplicates_detected: u64,
    pub duplicate_rate: f64,
    pub active_fingerprints: usize,
    pub dedup_pressure: u64,
}

impl Deduplicator {
    /// Create a deduplicator with the given window and capacity.
    pub fn new(window_seconds: u64, max_entries: usize) -> Self {
        Self {
            partitions: (0..PARTITIONS).map(|_| Mutex::new(Partition::default())).collect(),
            window: Duration::seconds(window_seconds as i64),
            max_entries,
            active: AtomicUsize::new(0),
            processed: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            pressure_events: AtomicU64::new(0),
        }
    }

    /// Build from the global configuration.
    pub fn from_config() -> Self {
        let cfg = &crate::config::get().ingest;
        Self::new(cfg.dedup_window_seconds, cfg.dedup_max_entries)
    }

    /// Check an event against the window, recording its fingerprint.
    ///
    /// Returns `true` when the event is a duplicate and must be dropped.
    /// Never blocks beyond the single partition lock.
    pub fn is_duplicate(&self, event: &RawEvent) -> bool {
        let fp = identity::fingerprint(event);
        self.check_fingerprint(&fp, Utc::now())
    }

    /// Fingerprint-level check, usable when the caller already computed it.
    pub fn check_fingerprint(&self, fingerprint: &str, now: DateTime<Utc>) -> bool {
        let index = partition_index(fingerprint);
        let mut partition = self.partitions[index]
            .lock()
            .expect("dedup partition lock poisoned");

        // Lazy eviction: drop everything in this partition past the window.
        let cutoff = now - self.window;
        let before = partition.entries.len();
        partition.entries.retain(|_, seen| *seen > cutoff);
        let evicted = before - partition.entries.len();
        if evicted > 0 {
            self.active.fetch_sub(evicted, Ordering::Relaxed);
        }

        if partition.entries.contains_key(fingerprint) {
            self.duplicates.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        // Eager eviction once the whole set exceeds its bound.
        if self.active.load(Ordering::Relaxed) >= self.max_entries {
            self.relieve_pressure(&mut partition);
        }

        partition
            .entries
            .insert(fingerprint.to_string(), now);
        self.active.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed);
        false
    }

    /// Drop the oldest half of a full partition. Runs when lazy eviction
    /// freed nothing because every entry is still fresh.
    fn relieve_pressure(&self, partition: &mut Partition) {
        if partition.entries.is_empty() {
            return;
        }
        let mut seen_times: Vec<DateTime<Utc>> = partition.entries.values().copied().collect();
        seen_times.sort_unstable();
        let median = seen_times[seen_times.len() / 2];

        let before = partition.entries.len();
        partition.entries.retain(|_, seen| *seen > median);
        let dropped = before - partition.entries.len();
        self.active.fetch_sub(dropped, Ordering::Relaxed);
        self.pressure_events.fetch_add(1, Ordering::Relaxed);

        warn!(
            dropped = dropped,
            remaining = partition.entries.len(),
            "Dedup set full of fresh fingerprints — dropped oldest half of partition"
        );
    }

    /// Deduplication statistics snapshot.
    pub fn stats(&self) -> DedupStats {
        let processed = self.processed.load(Ordering::Relaxed);
        let duplicates = self.duplicates.load(Ordering::Relaxed);
        let seen = processed + duplicates;
        DedupStats {
            processed_total: processed,
            duplicates_detected: duplicates,
            duplicate_rate: if seen > 0 {
                duplicates as f64 / seen as f64
            } else {
                0.0
            },
            active_fingerprints: self.active.load(Ordering::Relaxed),
            dedup_pressure: self.pressure_events.load(Ordering::Relaxed),
        }
    }
}

/// Partition index from the first digest byte (first two hex chars).
fn partition_index(fingerprint: &str) -> usize {
    let byte = u8::from_str_radix(fingerprint.get(0..2).unwrap_or("00"), 16).unwrap_or(0);
    byte as usize % PARTITIONS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn event(score: f64) -> RawEvent {
        let mut payload = BTreeMap::new();
        payload.insert("threat_score".to_string(), json!(score));
        RawEvent {
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            source: "sensor-1".to_string(),
            kind: EventKind::ThreatDetection,
            payload,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn second_identical_event_is_rejected() {
        let dedup = Deduplicator::new(60, 5_000);
        assert!(!dedup.is_duplicate(&event(0.9)));
        assert!(dedup.is_duplicate(&event(0.9)));

        let stats = dedup.stats();
        assert_eq!(stats.duplicates_detected, 1);
        assert_eq!(stats.processed_total, 1);
    }

    #[test]
    fn distinct_events_both_pass() {
        let dedup = Deduplicator::new(60, 5_000);
        assert!(!dedup.is_duplicate(&event(0.9)));
        assert!(!dedup.is_duplicate(&event(0.5)));
    }

    #[test]
    fn fingerprint_expires_after_window() {
        let dedup = Deduplicator::new(60, 5_000);
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(!dedup.check_fingerprint("ab00", t0));
        // Still inside the window 5 s later.
        assert!(dedup.check_fingerprint("ab00", t0 + Duration::seconds(5)));
        // Expired 61 s later.
        assert!(!dedup.check_fingerprint("ab00", t0 + Duration::seconds(61)));
    }

    #[test]
    fn capacity_pressure_drops_oldest_half_and_counts() {
        let dedup = Deduplicator::new(3_600, 4);
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        // All fingerprints share the partition prefix "aa" to force pressure.
        for i in 0..4 {
            let fp = format!("aa{:04}", i);
            assert!(!dedup.check_fingerprint(&fp, t0 + Duration::seconds(i)));
        }
        // Fifth fresh fingerprint triggers the pressure path and still lands.
        assert!(!dedup.check_fingerprint("aaffff", t0 + Duration::seconds(10)));

        let stats = dedup.stats();
        assert_eq!(stats.dedup_pressure, 1);
        assert!(stats.active_fingerprints <= 4);
    }
}
