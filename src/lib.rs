// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod dedupe;
pub mod digest;
pub mod enrich;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod relevance;
pub mod schedule;
pub mod seen;

// ---- Re-exports for stable public API ----
pub use crate::config::DigestConfig;
pub use crate::dedupe::{dedupe, Deduped, SeenIds};
pub use crate::digest::{assemble, Digest};
pub use crate::enrich::{EnrichedRecord, Enricher, EnrichmentOutcome, TextGenerator};
pub use crate::error::{PipelineError, PipelineResult};
pub use crate::ingest::types::{Collector, NormalizedRecord, SourceItem, SourceKind};
pub use crate::ingest::{normalize, Normalized};
pub use crate::notify::{dispatch, ChannelSender, DeliveryResult, DeliveryStatus};
pub use crate::pipeline::{Pipeline, RunSummary, StageCounts};
pub use crate::relevance::{filter, filter_records, KeywordSet};
pub use crate::seen::{JsonFileSeenStore, MemorySeenStore, RunLock, SeenStore};
