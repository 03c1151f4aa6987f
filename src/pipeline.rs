// src/pipeline.rs
//! One run: collect → normalize → dedupe → filter → enrich → assemble → dispatch.
//! Each stage takes the previous stage's full output. Only configuration errors,
//! every collector failing, or the seen-id store abort a run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::DigestConfig;
use crate::dedupe::{dedupe, SeenIds};
use crate::digest::{assemble, Digest};
use crate::enrich::Enricher;
use crate::error::{PipelineError, PipelineResult};
use crate::ingest::providers::build_collectors;
use crate::ingest::types::{Collector, SourceItem};
use crate::ingest::{collect_all, normalize};
use crate::notify::{build_channels, dispatch, ChannelSender, DeliveryResult};
use crate::relevance::{filter, KeywordSet};
use crate::seen::SeenStore;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The pipeline reached the end. Channel outcomes are in `deliveries`.
    Success,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageCounts {
    pub collected: usize,
    pub collector_failures: usize,
    pub malformed: usize,
    pub normalized: usize,
    pub duplicates: usize,
    pub previously_seen: usize,
    pub deduped: usize,
    pub filtered_out: usize,
    pub relevant: usize,
    pub enriched: usize,
    pub enrichment_fallbacks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    pub status: RunStatus,
    pub generated_at: DateTime<Utc>,
    pub counts: StageCounts,
    pub deliveries: Vec<DeliveryResult>,
}

impl RunSummary {
    pub fn delivered(&self) -> usize {
        self.deliveries.iter().filter(|d| d.is_sent()).count()
    }

    pub fn failed(&self) -> usize {
        self.deliveries.len() - self.delivered()
    }

    pub fn any_delivered(&self) -> bool {
        self.delivered() > 0
    }
}

/// Result of the pure core over one batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub summary: RunSummary,
    pub digest: Digest,
    /// Seen ids including this batch's survivors; persist only if something was delivered.
    pub seen_ids: SeenIds,
}

pub struct Pipeline {
    title: String,
    keywords: KeywordSet,
    collectors: Vec<Box<dyn Collector>>,
    enricher: Enricher,
    channels: Vec<Arc<dyn ChannelSender>>,
    delivery_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        title: impl Into<String>,
        keywords: KeywordSet,
        collectors: Vec<Box<dyn Collector>>,
        enricher: Enricher,
        channels: Vec<Arc<dyn ChannelSender>>,
        delivery_timeout: Duration,
    ) -> PipelineResult<Self> {
        if keywords.is_empty() {
            return Err(PipelineError::config("keyword list is empty"));
        }
        if channels.is_empty() {
            return Err(PipelineError::config("no delivery channels configured"));
        }
        Ok(Self {
            title: title.into(),
            keywords,
            collectors,
            enricher,
            channels,
            delivery_timeout,
        })
    }

    /// Build everything from a config; `env:` references are resolved and the
    /// result validated before any collaborator is constructed.
    pub fn from_config(cfg: &DigestConfig) -> PipelineResult<Self> {
        let cfg = cfg.resolved()?;
        let p = Self::new(
            cfg.digest.title.clone(),
            cfg.keyword_set()?,
            build_collectors(&cfg.collectors),
            Enricher::from_config(&cfg.enrich),
            build_channels(&cfg.channels)?,
            Duration::from_secs(cfg.delivery.timeout_secs),
        )?;
        info!(
            target: "pipeline",
            keywords = p.keywords.len(),
            collectors = p.collectors.len(),
            generator = p.enricher.generator_name(),
            channels = ?p.channel_names(),
            "pipeline ready"
        );
        Ok(p)
    }

    /// Swap the delivery targets (e.g. a log-only dry run).
    pub fn with_channels(mut self, channels: Vec<Arc<dyn ChannelSender>>) -> PipelineResult<Self> {
        if channels.is_empty() {
            return Err(PipelineError::config("no delivery channels configured"));
        }
        self.channels = channels;
        Ok(self)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    /// Full run. The seen set is loaded once and saved once; it is saved only
    /// when at least one channel accepted the digest.
    pub async fn run(&self, seen: &dyn SeenStore) -> PipelineResult<RunSummary> {
        let seen_ids = seen.load().map_err(PipelineError::SeenStore)?;
        let collected = collect_all(&self.collectors).await?;

        let mut outcome = self.run_batch(collected.items, seen_ids).await;
        outcome.summary.counts.collector_failures = collected.failures;

        metrics::gauge!("digest_last_run_ts").set(outcome.summary.generated_at.timestamp() as f64);
        metrics::gauge!("digest_last_run_items").set(outcome.digest.item_count as f64);

        if !outcome.summary.any_delivered() {
            warn!(target: "pipeline", "no channel delivered; seen ids not updated");
            return Ok(outcome.summary);
        }
        if let Err(source) = seen.save(&outcome.seen_ids) {
            warn!(
                target: "pipeline",
                delivered = outcome.summary.delivered(),
                error = %source,
                "digest delivered but seen ids not saved; next run may repeat items"
            );
            return Err(PipelineError::SeenSave {
                summary: Box::new(outcome.summary),
                source,
            });
        }
        Ok(outcome.summary)
    }

    /// Core stages over an already-collected batch. Never fails: per-item and
    /// per-channel problems end up in the counts and delivery results.
    pub async fn run_batch(&self, items: Vec<SourceItem>, seen_ids: SeenIds) -> BatchOutcome {
        let generated_at = Utc::now();
        let mut counts = StageCounts {
            collected: items.len(),
            ..StageCounts::default()
        };

        let normalized = normalize(items);
        counts.malformed = normalized.malformed;
        counts.normalized = normalized.records.len();

        let deduped = dedupe(normalized.records, seen_ids);
        counts.duplicates = deduped.duplicates;
        counts.previously_seen = deduped.previously_seen;
        counts.deduped = deduped.records.len();

        let relevant = filter(deduped.records, &self.keywords);
        counts.relevant = relevant.len();
        counts.filtered_out = counts.deduped - counts.relevant;

        let enriched = self.enricher.enrich(relevant).await;
        counts.enriched = enriched.records.len();
        counts.enrichment_fallbacks = enriched.fallbacks;

        let digest = assemble(enriched.records, generated_at, self.title.clone());
        let deliveries = dispatch(&digest, &self.channels, self.delivery_timeout).await;

        let summary = RunSummary {
            status: RunStatus::Success,
            generated_at,
            counts,
            deliveries,
        };
        info!(
            target: "pipeline",
            collected = summary.counts.collected,
            relevant = summary.counts.relevant,
            fallbacks = summary.counts.enrichment_fallbacks,
            delivered = summary.delivered(),
            failed = summary.failed(),
            "run finished"
        );
        BatchOutcome {
            summary,
            digest,
            seen_ids: deduped.seen_ids,
        }
    }
}
