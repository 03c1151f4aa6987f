// src/enrich/mod.rs
//! Enricher: display title + short summary per record, via a `TextGenerator`
//! with a local heuristic fallback. One output per input, input order preserved.

pub mod cache;
pub mod fallback;
pub mod generator;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::EnrichConfig;
use crate::ingest::types::NormalizedRecord;

pub use cache::CachingGenerator;
pub use generator::{
    sanitize_generated, DisabledGenerator, Generated, GenerationError, GenerationRequest,
    MockGenerator, TextGenerator,
};
pub use openai::OpenAiGenerator;

const DISPLAY_TITLE_MAX_CHARS: usize = 200;
const SUMMARY_MAX_CHARS: usize = 600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnrichmentOutcome {
    Generated,
    Fallback { reason: String },
}

impl EnrichmentOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, EnrichmentOutcome::Fallback { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub record: NormalizedRecord,
    pub display_title: String,
    pub summary: String,
    /// "Article" | "X Post" | "LinkedIn"
    pub tag: String,
    pub enrichment: EnrichmentOutcome,
}

impl EnrichedRecord {
    /// Heuristic-only enrichment. `display_title` and `summary` are never empty.
    pub fn fallback(record: NormalizedRecord, reason: impl Into<String>) -> Self {
        let display_title =
            fallback::fallback_title(&record.title, &record.body, record.url.as_deref());
        let summary = fallback::fallback_summary(&record.body, &display_title);
        Self {
            tag: record.tag().to_string(),
            display_title,
            summary,
            record,
            enrichment: EnrichmentOutcome::Fallback {
                reason: reason.into(),
            },
        }
    }

    fn generated(record: NormalizedRecord, g: Generated) -> Self {
        Self {
            tag: record.tag().to_string(),
            display_title: g.title,
            summary: g.summary,
            record,
            enrichment: EnrichmentOutcome::Generated,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Enriched {
    pub records: Vec<EnrichedRecord>,
    pub fallbacks: usize,
}

pub struct Enricher {
    generator: Arc<dyn TextGenerator>,
    concurrency: usize,
    call_timeout: Duration,
}

impl Enricher {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        concurrency: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            concurrency: concurrency.max(1),
            call_timeout,
        }
    }

    pub fn from_config(cfg: &EnrichConfig) -> Self {
        Self::new(
            build_generator(cfg),
            cfg.concurrency,
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    pub fn generator_name(&self) -> &'static str {
        self.generator.name()
    }

    async fn generate_one(&self, record: &NormalizedRecord) -> Result<Generated, GenerationError> {
        let req = GenerationRequest {
            id: record.id.clone(),
            title: record.title.clone(),
            body: record.body.clone(),
        };
        let g = tokio::time::timeout(self.call_timeout, self.generator.generate(&req))
            .await
            .map_err(|_| GenerationError::Timeout)??;
        let title = sanitize_generated(&g.title, DISPLAY_TITLE_MAX_CHARS);
        let summary = sanitize_generated(&g.summary, SUMMARY_MAX_CHARS);
        if title.is_empty() || summary.is_empty() {
            return Err(GenerationError::Malformed("blank title or summary".into()));
        }
        Ok(Generated { title, summary })
    }

    /// Calls run through a bounded pool and may complete in any order; the
    /// result is put back into input order before returning.
    pub async fn enrich(&self, records: Vec<NormalizedRecord>) -> Enriched {
        if records.is_empty() {
            return Enriched::default();
        }
        let total = records.len();

        let mut results: Vec<(usize, Result<Generated, GenerationError>)> = stream::iter(
            records
                .iter()
                .enumerate()
                .map(|(idx, rec)| async move { (idx, self.generate_one(rec).await) })
                .collect::<Vec<_>>(),
        )
        .buffer_unordered(self.concurrency)
        .collect()
        .await;
        results.sort_by_key(|(idx, _)| *idx);

        let mut out = Vec::with_capacity(total);
        let mut fallbacks = 0usize;
        for (record, (_, res)) in records.into_iter().zip(results) {
            match res {
                Ok(g) => out.push(EnrichedRecord::generated(record, g)),
                Err(e) => {
                    match &e {
                        GenerationError::Disabled => {
                            debug!(target: "enrich", id = %record.id, "generation disabled; using fallback")
                        }
                        _ => {
                            warn!(target: "enrich", id = %record.id, error = %e, "generation failed; using fallback")
                        }
                    }
                    fallbacks += 1;
                    out.push(EnrichedRecord::fallback(record, e.to_string()));
                }
            }
        }

        metrics::counter!("digest_enrich_fallback_total").increment(fallbacks as u64);
        info!(
            target: "enrich",
            total,
            fallbacks,
            generator = self.generator.name(),
            "enrichment done"
        );
        Enriched {
            records: out,
            fallbacks,
        }
    }
}

/// Pick the generator for a resolved config.
///
/// * `AI_TEST_MODE=mock` → deterministic mock behind the cache.
/// * `enabled = false` → every record falls back.
/// * `provider = "openai"` → OpenAI behind the file cache + daily limit.
pub fn build_generator(cfg: &EnrichConfig) -> Arc<dyn TextGenerator> {
    let test_mode = std::env::var("AI_TEST_MODE")
        .map(|v| v.eq_ignore_ascii_case("mock"))
        .unwrap_or(false);
    if test_mode {
        return Arc::new(CachingGenerator::new(
            MockGenerator,
            cfg.cache_dir.clone(),
            cfg.daily_limit,
        ));
    }
    if !cfg.enabled {
        return Arc::new(DisabledGenerator);
    }
    match cfg.provider.trim().to_ascii_lowercase().as_str() {
        "openai" => {
            let mut inner =
                OpenAiGenerator::new(cfg.api_key.clone(), cfg.model.clone(), cfg.topic.clone());
            if let Some(endpoint) = cfg
                .endpoint
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
            {
                inner = inner.with_endpoint(endpoint);
            }
            Arc::new(CachingGenerator::new(
                inner,
                cfg.cache_dir.clone(),
                cfg.daily_limit,
            ))
        }
        "mock" => Arc::new(MockGenerator),
        other => {
            warn!(target: "enrich", provider = other, "unknown provider; enrichment disabled");
            Arc::new(DisabledGenerator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::SourceKind;
    use async_trait::async_trait;

    fn rec(id: &str, title: &str, body: &str) -> NormalizedRecord {
        NormalizedRecord {
            id: id.into(),
            source_kind: SourceKind::LinkedIn,
            source: "test".into(),
            title: title.into(),
            body: body.into(),
            url: None,
            author: None,
            timestamp: None,
        }
    }

    /// Completes later for earlier ids so completion order is reversed.
    struct Staggered;

    #[async_trait]
    impl TextGenerator for Staggered {
        async fn generate(&self, req: &GenerationRequest) -> Result<Generated, GenerationError> {
            let n: u64 = req.id.parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(50 - n * 10)).await;
            if n == 2 {
                return Err(GenerationError::QuotaExceeded);
            }
            Ok(Generated {
                title: format!("gen {}", req.id),
                summary: "\"Summary: short.\"".into(),
            })
        }
        fn name(&self) -> &'static str {
            "staggered"
        }
    }

    struct Hangs;

    #[async_trait]
    impl TextGenerator for Hangs {
        async fn generate(&self, _req: &GenerationRequest) -> Result<Generated, GenerationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(GenerationError::Timeout)
        }
        fn name(&self) -> &'static str {
            "hangs"
        }
    }

    #[tokio::test]
    async fn order_restored_and_failures_isolated() {
        let e = Enricher::new(Arc::new(Staggered), 4, Duration::from_secs(5));
        let input = (0..4)
            .map(|i| rec(&i.to_string(), "", &format!("Body {i}. More.")))
            .collect();
        let out = e.enrich(input).await;

        let ids: Vec<_> = out.records.iter().map(|r| r.record.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3"]);
        assert_eq!(out.fallbacks, 1);
        assert_eq!(out.records[0].display_title, "gen 0");
        assert_eq!(out.records[0].summary, "short.");
        assert!(out.records[2].enrichment.is_fallback());
        assert_eq!(out.records[2].display_title, "Body 2. More.");
        assert_eq!(out.records[2].tag, "LinkedIn");
    }

    #[tokio::test(start_paused = true)]
    async fn hung_call_times_out_into_fallback() {
        let e = Enricher::new(Arc::new(Hangs), 2, Duration::from_millis(100));
        let out = e.enrich(vec![rec("a", "Title here", "")]).await;
        assert_eq!(out.fallbacks, 1);
        assert_eq!(out.records[0].display_title, "Title here");
        assert_eq!(out.records[0].summary, "Title here");
        assert_eq!(
            out.records[0].enrichment,
            EnrichmentOutcome::Fallback {
                reason: GenerationError::Timeout.to_string()
            }
        );
    }

    #[test]
    fn disabled_config_builds_disabled_generator() {
        let cfg = EnrichConfig {
            enabled: false,
            ..EnrichConfig::default()
        };
        if std::env::var("AI_TEST_MODE").is_err() {
            assert_eq!(build_generator(&cfg).name(), "disabled");
        }
    }
}
