//! Event ingestion module
//!
//! Front half of the pipeline: deduplication, enrichment, and batched
//! hand-off to persistence sinks.
//!
//! ```text
//! upstream sensor → Deduplicator → Enricher → Batcher → sinks
//! ```
//!
//! A raw event is dropped here if its fingerprint was already seen inside
//! the dedup window; otherwise it is upgraded to an `EnrichedEvent` exactly
//! once and buffered until a count-or-deadline flush.

mod dedup;
mod enrich;
mod batcher;

pub use batcher::{BatchSink, Batcher, BatcherStats, SinkError};
pub use dedup::{DedupStats, Deduplicator};
pub use enrich::{Enricher, EnricherStats, ThreatIntelEntry, ThreatIntelTable};
