//! Storage & egress adapter seams
//!
//! The core never talks to a database, notification provider, or remote
//! region directly: each external collaborator sits behind a trait here,
//! with exact on-disk/wire formats delegated to the adapter. Failures
//! surface as error results, never as panics across the boundary.
//!
//! In-memory implementations live in `memory` for tests and the synthetic
//! simulation binary.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{
    AlertNotification, EnrichedEvent, ReplicaAck, StateChange, TimeSeriesPoint,
};

/// Errors surfaced by storage and egress adapters.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("notification send failed: {0}")]
    SendFailed(String),

    #[error("replication failed: {0}")]
    ReplicationFailed(String),

    #[error("timeout after {0} ms")]
    Timeout(u64),
}

/// Query resolution steps accepted by the time-series store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStep {
    OneSecond,
    OneMinute,
    FiveMinutes,
    OneHour,
    OneDay,
}

impl QueryStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStep::OneSecond => "1s",
            QueryStep::OneMinute => "1m",
            QueryStep::FiveMinutes => "5m",
            QueryStep::OneHour => "1h",
            QueryStep::OneDay => "1d",
        }
    }

    pub fn seconds(&self) -> u64 {
        match self {
            QueryStep::OneSecond => 1,
            QueryStep::OneMinute => 60,
            QueryStep::FiveMinutes => 300,
            QueryStep::OneHour => 3_600,
            QueryStep::OneDay => 86_400,
        }
    }
}

/// Result of a range query.
#[derive(Debug, Clone)]
pub struct RangeResult {
    pub metric_name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub points: Vec<(DateTime<Utc>, f64)>,
}

/// Time-series persistence adapter.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Adapter name used in logs and health tracking.
    fn name(&self) -> &str;

    async fn write_point(&self, point: &TimeSeriesPoint) -> Result<(), StorageError>;

    async fn write_batch(&self, events: &[EnrichedEvent]) -> Result<usize, StorageError>;

    async fn query_range(
        &self,
        metric_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: QueryStep,
    ) -> Result<RangeResult, StorageError>;

    async fn query_instant(
        &self,
        metric_name: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<f64>, StorageError>;

    /// Delete points older than the cutoff; returns how many were removed.
    async fn delete_old(&self, before: DateTime<Utc>) -> Result<usize, StorageError>;

    async fn create_retention(&self, name: &str, days: u32) -> Result<(), StorageError>;
}

/// Outbound notification channel adapter. Delivery is at-most-once from the
/// core's perspective.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, notification: &AlertNotification) -> Result<(), StorageError>;
}

/// Per-region replication adapter. The adapter measures and reports its own
/// latency; the core adds no synthetic delays.
#[async_trait]
pub trait RegionReplicator: Send + Sync {
    fn name(&self) -> &str;

    async fn replicate(
        &self,
        region_id: &str,
        change: &StateChange,
    ) -> Result<ReplicaAck, StorageError>;
}
