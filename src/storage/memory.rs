//! In-memory adapter implementations
//!
//! Back the adapter traits with process-local state for tests and the
//! synthetic simulation run. Retention and downsampling stay coarse; a
//! production deployment plugs real adapters in instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Instant;
use tracing::debug;

use crate::ingest::{BatchSink, SinkError};
use crate::types::{
    AlertNotification, EnrichedEvent, ReplicaAck, StateChange, TimeSeriesPoint,
};

use super::{
    NotificationSender, QueryStep, RangeResult, RegionReplicator, StorageError, TimeSeriesStore,
};

// ============================================================================
// Time-series store
// ============================================================================

/// In-memory time-series store.
pub struct MemoryTimeSeriesStore {
    /// metric -> ordered (timestamp, value)
    series: Mutex<HashMap<String, BTreeMap<DateTime<Utc>, f64>>>,
    batches: Mutex<Vec<Vec<EnrichedEvent>>>,
    retentions: Mutex<HashMap<String, u32>>,
}

impl MemoryTimeSeriesStore {
    pub fn new() -> Self {
        Self {
            series: Mutex::new(HashMap::new()),
            batches: Mutex::new(Vec::new()),
            retentions: Mutex::new(HashMap::new()),
        }
    }

    /// Batches persisted so far (test observability).
    pub fn batch_count(&self) -> usize {
        self.batches.lock().expect("batch store lock poisoned").len()
    }

    /// Total events across persisted batches.
    pub fn event_count(&self) -> usize {
        self.batches
            .lock()
            .expect("batch store lock poisoned")
            .iter()
            .map(|b| b.len())
            .sum()
    }
}

impl Default for MemoryTimeSeriesStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimeSeriesStore for MemoryTimeSeriesStore {
    fn name(&self) -> &str {
        "memory-tsdb"
    }

    async fn write_point(&self, point: &TimeSeriesPoint) -> Result<(), StorageError> {
        let mut series = self.series.lock().expect("series lock poisoned");
        series
            .entry(point.metric_name.clone())
            .or_insert_with(BTreeMap::new)
            .insert(point.timestamp, point.value);
        Ok(())
    }

    async fn write_batch(&self, events: &[EnrichedEvent]) -> Result<usize, StorageError> {
        self.batches
            .lock()
            .expect("batch store lock poisoned")
            .push(events.to_vec());
        Ok(events.len())
    }

    async fn query_range(
        &self,
        metric_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: QueryStep,
    ) -> Result<RangeResult, StorageError> {
        let series = self.series.lock().expect("series lock poisoned");
        let points = series
            .get(metric_name)
            .map(|map| {
                map.range(start..=end)
                    .map(|(ts, v)| (*ts, *v))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        debug!(
            metric = metric_name,
            step = step.as_str(),
            points = points.len(),
            "Range query served from memory"
        );
        Ok(RangeResult {
            metric_name: metric_name.to_string(),
            start,
            end,
            points,
        })
    }

    async fn query_instant(
        &self,
        metric_name: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<f64>, StorageError> {
        let series = self.series.lock().expect("series lock poisoned");
        Ok(series
            .get(metric_name)
            .and_then(|map| map.range(..=at).next_back().map(|(_, v)| *v)))
    }

    async fn delete_old(&self, before: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut series = self.series.lock().expect("series lock poisoned");
        let mut removed = 0;
        for map in series.values_mut() {
            let keep = map.split_off(&before);
            removed += map.len();
            *map = keep;
        }
        Ok(removed)
    }

    async fn create_retention(&self, name: &str, days: u32) -> Result<(), StorageError> {
        self.retentions
            .lock()
            .expect("retention lock poisoned")
            .insert(name.to_string(), days);
        Ok(())
    }
}

/// The time-series store also serves as a batch sink for the batcher.
#[async_trait]
impl BatchSink for MemoryTimeSeriesStore {
    fn name(&self) -> &str {
        "memory-tsdb"
    }

    async fn write_batch(&self, batch: &[EnrichedEvent]) -> Result<(), SinkError> {
        TimeSeriesStore::write_batch(self, batch)
            .await
            .map(|_| ())
            .map_err(|e| SinkError::WriteFailed(e.to_string()))
    }
}

// ============================================================================
// Notification sender
// ============================================================================

/// In-memory notification sender capturing everything it "delivers".
pub struct MemoryNotificationSender {
    sent: Mutex<Vec<AlertNotification>>,
}

impl MemoryNotificationSender {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<AlertNotification> {
        self.sent.lock().expect("sent lock poisoned").clone()
    }
}

impl Default for MemoryNotificationSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSender for MemoryNotificationSender {
    fn name(&self) -> &str {
        "memory-notifier"
    }

    async fn send(&self, notification: &AlertNotification) -> Result<(), StorageError> {
        self.sent
            .lock()
            .expect("sent lock poisoned")
            .push(notification.clone());
        Ok(())
    }
}

// ============================================================================
// Region replicator
// ============================================================================

/// In-memory replicator that records changes per region and reports its
/// measured latency. Regions can be marked unreachable for failover tests.
pub struct MemoryRegionReplicator {
    replicated: Mutex<HashMap<String, Vec<StateChange>>>,
    unreachable: Mutex<Vec<String>>,
}

impl MemoryRegionReplicator {
    pub fn new() -> Self {
        Self {
            replicated: Mutex::new(HashMap::new()),
            unreachable: Mutex::new(Vec::new()),
        }
    }

    /// Mark a region unreachable; subsequent replications to it fail.
    pub fn set_unreachable(&self, region_id: &str) {
        self.unreachable
            .lock()
            .expect("unreachable lock poisoned")
            .push(region_id.to_string());
    }

    pub fn replicated_to(&self, region_id: &str) -> Vec<StateChange> {
        self.replicated
            .lock()
            .expect("replicated lock poisoned")
            .get(region_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for MemoryRegionReplicator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegionReplicator for MemoryRegionReplicator {
    fn name(&self) -> &str {
        "memory-replicator"
    }

    async fn replicate(
        &self,
        region_id: &str,
        change: &StateChange,
    ) -> Result<ReplicaAck, StorageError> {
        let started = Instant::now();
        if self
            .unreachable
            .lock()
            .expect("unreachable lock poisoned")
            .iter()
            .any(|r| r == region_id)
        {
            return Err(StorageError::ReplicationFailed(format!(
                "region {region_id} unreachable"
            )));
        }
        self.replicated
            .lock()
            .expect("replicated lock poisoned")
            .entry(region_id.to_string())
            .or_insert_with(Vec::new)
            .push(change.clone());
        Ok(ReplicaAck {
            region_id: region_id.to_string(),
            ok: true,
            latency_ms: started.elapsed().as_secs_f64() * 1_000.0,
        })
    }
}
