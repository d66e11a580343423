//! MeshWarden - Security Telemetry & Automated Response Engine
//!
//! Real-time ingestion, analytics, and automated response for mesh VPN
//! fleet telemetry.
//!
//! # Usage
//!
//! ```bash
//! # Run against built-in synthetic telemetry
//! cargo run --release -- --simulate 500
//!
//! # Run with an explicit config file
//! MESHWARDEN_CONFIG=meshwarden.toml cargo run --release
//! ```
//!
//! # Environment Variables
//!
//! - `MESHWARDEN_CONFIG`: Path to the engine TOML config
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::Result;
use clap::Parser;
use rand::Rng;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use meshwarden::config::{self, EngineConfig};
use meshwarden::bus::EventBus;
use meshwarden::health::HealthMonitor;
use meshwarden::ingest::Batcher;
use meshwarden::learning::LearningFramework;
use meshwarden::pipeline::EventPipeline;
use meshwarden::response::{
    ActionExecutor, ExecutorError, PlaybookRegistry, RemediationExecutor, WorkflowOrchestrator,
};
use meshwarden::storage::memory::{MemoryNotificationSender, MemoryTimeSeriesStore};
use meshwarden::storage::{NotificationSender, TimeSeriesStore};
use meshwarden::types::{EventKind, RawEvent, RemediationAction};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "meshwarden")]
#[command(about = "MeshWarden security telemetry and automated response engine")]
#[command(version)]
struct CliArgs {
    /// Number of synthetic events to generate before printing stats and
    /// exiting (0 = run until interrupted)
    #[arg(long, default_value_t = 0)]
    simulate: u64,

    /// Interval between synthetic events (milliseconds)
    #[arg(long, default_value_t = 10)]
    interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    config::init(EngineConfig::load());
    let cfg = config::get();
    info!(node = %cfg.node.node_id, region = %cfg.node.region, "MeshWarden starting");

    let cancel = CancellationToken::new();

    // Shared observability surfaces.
    let bus = Arc::new(EventBus::from_config());
    let health = Arc::new(HealthMonitor::from_config());

    // Persistence and notification adapters (in-memory for the synthetic
    // run; production deployments register real adapters here).
    let store = Arc::new(MemoryTimeSeriesStore::new());
    let notifier = Arc::new(MemoryNotificationSender::new());

    // Batching toward the persistence sink.
    let batcher = Arc::new(Batcher::from_config());
    batcher.register_sink(store.clone());
    tokio::spawn(Arc::clone(&batcher).run_deadline_loop(cancel.clone()));

    // Response workflow. The synthetic run registers log-only executors so
    // remediation exercises the full execute/rollback path without touching
    // the network.
    let workflow = Arc::new(WorkflowOrchestrator::new(
        RemediationExecutor::new(log_only_executors()),
        PlaybookRegistry::with_defaults(),
        Arc::clone(&bus),
        vec![notifier.clone() as Arc<dyn NotificationSender>],
    ));
    tokio::spawn(workflow.escalation().run_sweep_loop(cancel.clone()));

    // Continuous learning over the ensemble's detectors.
    let learning = Arc::new(LearningFramework::new(vec![
        "isolation_score".to_string(),
        "sequence_reconstruction".to_string(),
        "bayesian_posterior".to_string(),
    ]));
    tokio::spawn(Arc::clone(&learning).run_schedule_loop(cancel.clone()));

    // Daily retention sweep on the time-series store.
    {
        let store = store.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(24 * 3_600));
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = interval.tick() => {
                        let cutoff = chrono::Utc::now() - chrono::Duration::days(7);
                        match store.delete_old(cutoff).await {
                            Ok(removed) => info!(removed = removed, "Retention sweep complete"),
                            Err(e) => warn!(error = %e, "Retention sweep failed"),
                        }
                    }
                }
            }
        });
    }

    let pipeline = Arc::new(EventPipeline::new(
        Arc::clone(&batcher),
        Arc::clone(&workflow),
        Arc::clone(&bus),
        Arc::clone(&health),
    ));

    // Synthetic telemetry source.
    let source = tokio::spawn(run_synthetic_source(
        Arc::clone(&pipeline),
        args.simulate,
        args.interval_ms,
        cancel.clone(),
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received — shutting down");
            cancel.cancel();
        }
        _ = source => {
            info!("Synthetic source finished");
            cancel.cancel();
        }
    }

    // Final flush and status report.
    batcher.flush().await;
    let stats = pipeline.stats();
    let report = health.system_report();
    info!(%stats, "Pipeline finished");
    info!(
        system_state = %report.state,
        batches = store.batch_count(),
        events_persisted = store.event_count(),
        notifications = notifier.sent().len(),
        "Shutdown complete"
    );
    Ok(())
}

/// Log-only action executor used by the synthetic run.
struct LogOnlyExecutor(RemediationAction);

#[async_trait::async_trait]
impl ActionExecutor for LogOnlyExecutor {
    fn action(&self) -> RemediationAction {
        self.0
    }

    async fn execute(
        &self,
        target: &str,
        _parameters: &BTreeMap<String, serde_json::Value>,
    ) -> Result<serde_json::Value, ExecutorError> {
        info!(action = %self.0, target = target, "Simulated remediation action");
        Ok(json!({ "action": self.0.as_str(), "target": target }))
    }

    async fn rollback(&self, result: &serde_json::Value) -> Result<(), ExecutorError> {
        info!(result = %result, "Simulated rollback");
        Ok(())
    }
}

/// One log-only executor per action kind.
fn log_only_executors() -> Vec<Arc<dyn ActionExecutor>> {
    [
        RemediationAction::BlockSourceIp,
        RemediationAction::QuarantineNode,
        RemediationAction::IsolateTunnel,
        RemediationAction::ApplyRateLimit,
        RemediationAction::ResetSession,
        RemediationAction::EnableDeepInspection,
        RemediationAction::RotateCredentials,
        RemediationAction::DisableService,
        RemediationAction::IncreaseMonitoring,
        RemediationAction::CollectEvidence,
    ]
    .into_iter()
    .map(|a| Arc::new(LogOnlyExecutor(a)) as Arc<dyn ActionExecutor>)
    .collect()
}

/// Generate synthetic telemetry: a stream of performance metrics with the
/// occasional threat-detection burst.
async fn run_synthetic_source(
    pipeline: Arc<EventPipeline>,
    count: u64,
    interval_ms: u64,
    cancel: CancellationToken,
) {
    let mut sent = 0u64;
    loop {
        if cancel.is_cancelled() || (count > 0 && sent >= count) {
            return;
        }
        let event = synthetic_event(sent);
        pipeline.process_event(event).await;
        sent += 1;
        if sent % 100 == 0 {
            info!(sent = sent, "Synthetic events generated");
        }
        tokio::time::sleep(std::time::Duration::from_millis(interval_ms)).await;
    }
}

fn synthetic_event(seq: u64) -> RawEvent {
    let mut rng = rand::thread_rng();
    let mut payload = BTreeMap::new();
    let mut metadata = BTreeMap::new();
    metadata.insert("region".to_string(), json!("us-east"));
    metadata.insert("seq".to_string(), json!(seq));

    // Every 25th event is a threat burst; the rest are node metrics.
    if seq % 25 == 24 {
        let traffic: Vec<serde_json::Value> = (0..20)
            .map(|i| {
                json!({
                    "timestamp": chrono::Utc::now(),
                    "source_ip": "203.0.113.9",
                    "destination_ip": format!("10.0.0.{}", i % 8 + 1),
                    "port": 1_000 + (seq + i) % 2_000,
                    "protocol": "tcp",
                    "packet_size": rng.gen_range(64..1_500),
                    "flags": ["SYN"],
                    "ttl": 64,
                    "window_size": 65_535,
                })
            })
            .collect();
        payload.insert("threat_type".to_string(), json!("port_scan"));
        payload.insert("threat_score".to_string(), json!(rng.gen_range(0.5..1.0)));
        payload.insert("affected_nodes".to_string(), json!(["node-1", "node-2"]));
        payload.insert("traffic".to_string(), json!(traffic));
        RawEvent {
            timestamp: chrono::Utc::now(),
            source: "threat-sensor-1".to_string(),
            kind: EventKind::ThreatDetection,
            payload,
            metadata,
        }
    } else {
        payload.insert("metric_name".to_string(), json!("tunnel_throughput_mbps"));
        payload.insert(
            "value".to_string(),
            json!(100.0 + 10.0 * ((seq as f64) / 50.0).sin() + rng.gen_range(-2.0..2.0)),
        );
        RawEvent {
            timestamp: chrono::Utc::now(),
            source: format!("node-{}", seq % 5 + 1),
            kind: EventKind::PerformanceMetric,
            payload,
            metadata,
        }
    }
}
