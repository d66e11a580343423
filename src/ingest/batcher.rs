//! Batcher — count-or-deadline flush of enriched events to sinks
//!
//! Buffers enriched events until either the batch size is reached or the
//! deadline since the first buffered event expires. Flushes invoke every
//! registered sink concurrently; a failing sink retries with exponential
//! backoff without blocking the others. The buffer is snapshotted and moved
//! out before any await, so no lock is held across a suspension point.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::EnrichedEvent;

/// Errors surfaced by batch sinks. Never crosses the boundary as a panic.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink write failed: {0}")]
    WriteFailed(String),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

/// Downstream persistence sink for enriched-event batches.
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Sink name used in logs and health tracking.
    fn name(&self) -> &str;

    /// Persist one batch. Called once per flush per sink.
    async fn write_batch(&self, batch: &[EnrichedEvent]) -> Result<(), SinkError>;
}

/// Buffered state guarded by the batcher mutex.
#[derive(Default)]
struct Buffer {
    events: Vec<EnrichedEvent>,
    first_event_at: Option<DateTime<Utc>>,
}

/// Count-or-deadline event batcher.
pub struct Batcher {
    buffer: Mutex<Buffer>,
    sinks: Mutex<Vec<Arc<dyn BatchSink>>>,
    batch_size: usize,
    deadline: Duration,
    retry_attempts: u32,
    retry_base: Duration,
    batches_flushed: AtomicU64,
    events_flushed: AtomicU64,
    sink_failures: AtomicU64,
}

/// Point-in-time batching statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatcherStats {
    pub total_batches: u64,
    pub total_events: u64,
    pub current_batch_size: usize,
    pub avg_batch_size: f64,
    pub sink_failures: u64,
}

impl Batcher {
    pub fn new(batch_size: usize, deadline_seconds: u64) -> Self {
        let cfg = &crate::config::get().ingest;
        Self {
            buffer: Mutex::new(Buffer::default()),
            sinks: Mutex::new(Vec::new()),
            batch_size,
            deadline: Duration::from_secs(deadline_seconds),
            retry_attempts: cfg.sink_retry_attempts,
            retry_base: Duration::from_secs(cfg.sink_retry_base_seconds),
            batches_flushed: AtomicU64::new(0),
            events_flushed: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
        }
    }

    /// Build from the global configuration.
    pub fn from_config() -> Self {
        let cfg = &crate::config::get().ingest;
        Self::new(cfg.batch_size, cfg.batch_timeout_seconds)
    }

    /// Register a persistence sink. Sinks registered after startup receive
    /// only subsequent batches.
    pub fn register_sink(&self, sink: Arc<dyn BatchSink>) {
        info!(sink = sink.name(), "Batch sink registered");
        self.sinks.lock().expect("sink registry lock poisoned").push(sink);
    }

    /// Buffer one event; flushes immediately when the size threshold is hit.
    pub async fn add_event(&self, event: EnrichedEvent) {
        let ready = {
            let mut buffer = self.buffer.lock().expect("batch buffer lock poisoned");
            if buffer.first_event_at.is_none() {
                buffer.first_event_at = Some(Utc::now());
            }
            buffer.events.push(event);
            buffer.events.len() >= self.batch_size
        };
        if ready {
            self.flush().await;
        }
    }

    /// Flush the current buffer to every sink, concurrently per sink.
    pub async fn flush(&self) {
        let batch = {
            let mut buffer = self.buffer.lock().expect("batch buffer lock poisoned");
            if buffer.events.is_empty() {
                return;
            }
            buffer.first_event_at = None;
            std::mem::take(&mut buffer.events)
        };

        let sinks: Vec<Arc<dyn BatchSink>> = self
            .sinks
            .lock()
            .expect("sink registry lock poisoned")
            .clone();

        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.events_flushed
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        debug!(events = batch.len(), sinks = sinks.len(), "Flushing batch");

        let batch = Arc::new(batch);
        let handles: Vec<_> = sinks
            .into_iter()
            .map(|sink| {
                let batch = Arc::clone(&batch);
                let attempts = self.retry_attempts;
                let base = self.retry_base;
                tokio::spawn(
                    async move { write_with_backoff(sink, &batch, attempts, base).await },
                )
            })
            .collect();
        for outcome in futures::future::join_all(handles).await {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    self.sink_failures.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(error = %e, "Sink flush task panicked");
                    self.sink_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Deadline loop: flushes whenever the oldest buffered event has waited
    /// past the deadline. Run from `tokio::spawn`; stops on cancellation.
    pub async fn run_deadline_loop(self: Arc<Self>, cancel: CancellationToken) {
        let tick = Duration::from_millis(250.min(self.deadline.as_millis() as u64 / 2).max(50));
        info!(deadline_secs = self.deadline.as_secs(), "Batcher deadline loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // Final flush so buffered events are not lost on shutdown.
                    self.flush().await;
                    info!("Batcher deadline loop stopped");
                    return;
                }
                _ = tokio::time::sleep(tick) => {
                    let expired = {
                        let buffer = self.buffer.lock().expect("batch buffer lock poisoned");
                        buffer.first_event_at.is_some_and(|first| {
                            (Utc::now() - first).num_milliseconds() as u128
                                >= self.deadline.as_millis()
                        })
                    };
                    if expired {
                        self.flush().await;
                    }
                }
            }
        }
    }

    pub fn stats(&self) -> BatcherStats {
        let batches = self.batches_flushed.load(Ordering::Relaxed);
        let events = self.events_flushed.load(Ordering::Relaxed);
        BatcherStats {
            total_batches: batches,
            total_events: events,
            current_batch_size: self.buffer.lock().expect("batch buffer lock poisoned").events.len(),
            avg_batch_size: if batches > 0 {
                events as f64 / batches as f64
            } else {
                0.0
            },
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
        }
    }
}

/// Write a batch to one sink, retrying with exponential backoff
/// (base, 2×base, 4×base, …) for the configured number of attempts.
async fn write_with_backoff(
    sink: Arc<dyn BatchSink>,
    batch: &[EnrichedEvent],
    attempts: u32,
    base: Duration,
) -> Result<(), SinkError> {
    let mut delay = base;
    let mut last_err = None;
    for attempt in 1..=attempts {
        match sink.write_batch(batch).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(
                    sink = sink.name(),
                    attempt = attempt,
                    error = %e,
                    "Sink write failed"
                );
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| SinkError::WriteFailed("no attempts made".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventKind, Severity};
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;

    fn enriched(n: usize) -> EnrichedEvent {
        EnrichedEvent {
            timestamp: Utc::now(),
            source: format!("sensor-{n}"),
            kind: EventKind::NetworkMetric,
            severity: Severity::Info,
            payload: BTreeMap::new(),
            metadata: BTreeMap::new(),
            enrichment: crate::types::Enrichment {
                threat_context: crate::types::ThreatContext::unknown("none"),
                source_reputation: crate::types::SourceReputation {
                    source: format!("sensor-{n}"),
                    trust_score: 0.95,
                    previous_events: 0,
                },
                historical_patterns: crate::types::PatternSummary {
                    recent_from_source: 0,
                    recent_of_kind: 0,
                },
            },
            correlations: Vec::new(),
            original_hash: format!("hash-{n}"),
            processed_at: Utc::now(),
        }
    }

    struct CountingSink {
        batches: AtomicUsize,
        events: AtomicUsize,
    }

    #[async_trait]
    impl BatchSink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        async fn write_batch(&self, batch: &[EnrichedEvent]) -> Result<(), SinkError> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.events.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    struct FlakySink {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl BatchSink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn write_batch(&self, _batch: &[EnrichedEvent]) -> Result<(), SinkError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(SinkError::WriteFailed("transient".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn count_threshold_triggers_flush() {
        let batcher = Batcher::new(3, 60);
        let sink = Arc::new(CountingSink {
            batches: AtomicUsize::new(0),
            events: AtomicUsize::new(0),
        });
        batcher.register_sink(sink.clone());

        for i in 0..3 {
            batcher.add_event(enriched(i)).await;
        }

        assert_eq!(sink.batches.load(Ordering::SeqCst), 1);
        assert_eq!(sink.events.load(Ordering::SeqCst), 3);
        assert_eq!(batcher.stats().total_batches, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_sink_failure_retries_with_backoff() {
        let sink = Arc::new(FlakySink {
            calls: AtomicUsize::new(0),
            fail_first: 2,
        });
        let batch = vec![enriched(0)];
        let result = write_with_backoff(
            sink.clone(),
            &batch,
            3,
            Duration::from_secs(1),
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_buffer_flush_is_a_no_op() {
        let batcher = Batcher::new(10, 60);
        batcher.flush().await;
        assert_eq!(batcher.stats().total_batches, 0);
    }
}
