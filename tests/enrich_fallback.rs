// tests/enrich_fallback.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mention_digest::enrich::{Generated, GenerationError, GenerationRequest, MockGenerator};
use mention_digest::{Enricher, EnrichmentOutcome, NormalizedRecord, SourceKind, TextGenerator};

fn rec(i: usize, title: &str, body: &str, url: Option<&str>) -> NormalizedRecord {
    NormalizedRecord {
        id: format!("id{i}"),
        source_kind: if i % 2 == 0 { SourceKind::Article } else { SourceKind::XPost },
        source: "test".into(),
        title: title.into(),
        body: body.into(),
        url: url.map(str::to_string),
        author: None,
        timestamp: None,
    }
}

/// Fails every call, with a rotating error kind.
struct AlwaysFails(AtomicUsize);

#[async_trait]
impl TextGenerator for AlwaysFails {
    async fn generate(&self, _req: &GenerationRequest) -> Result<Generated, GenerationError> {
        let n = self.0.fetch_add(1, Ordering::SeqCst);
        Err(match n % 3 {
            0 => GenerationError::Timeout,
            1 => GenerationError::QuotaExceeded,
            _ => GenerationError::Malformed("not json".into()),
        })
    }
    fn name(&self) -> &'static str {
        "always-fails"
    }
}

/// Returns whitespace only; must be treated as malformed.
struct Blank;

#[async_trait]
impl TextGenerator for Blank {
    async fn generate(&self, _req: &GenerationRequest) -> Result<Generated, GenerationError> {
        Ok(Generated {
            title: "  ".into(),
            summary: "\n".into(),
        })
    }
    fn name(&self) -> &'static str {
        "blank"
    }
}

fn inputs() -> Vec<NormalizedRecord> {
    vec![
        rec(0, "Companies reincorporate in Nevada", "Three firms filed. A fourth is expected! More soon.", None),
        rec(1, "", "Delaware's Court of Chancery ruled today on a long-running dispute about board control and fiduciary duty", None),
        rec(2, "", "", Some("https://example.com/only-a-link")),
        rec(3, "", "", None),
    ]
}

#[tokio::test]
async fn always_failing_generator_still_yields_one_complete_record_each() {
    let e = Enricher::new(
        Arc::new(AlwaysFails(AtomicUsize::new(0))),
        3,
        Duration::from_secs(2),
    );
    let out = e.enrich(inputs()).await;

    assert_eq!(out.records.len(), 4);
    assert_eq!(out.fallbacks, 4);
    for r in &out.records {
        assert!(!r.display_title.trim().is_empty(), "{:?}", r.record.id);
        assert!(!r.summary.trim().is_empty(), "{:?}", r.record.id);
        assert!(r.enrichment.is_fallback());
    }

    assert_eq!(out.records[0].display_title, "Companies reincorporate in Nevada");
    assert_eq!(out.records[0].summary, "Three firms filed. A fourth is expected!");
    assert!(out.records[1].display_title.ends_with("..."));
    assert!(out.records[1].display_title.chars().count() <= 83);
    assert_eq!(out.records[1].tag, "X Post");
    assert_eq!(out.records[2].display_title, "https://example.com/only-a-link");
    assert_eq!(out.records[3].display_title, "Untitled");
}

#[tokio::test]
async fn blank_generation_is_treated_as_failure() {
    let e = Enricher::new(Arc::new(Blank), 1, Duration::from_secs(1));
    let out = e.enrich(inputs()).await;
    assert_eq!(out.fallbacks, 4);
    assert!(matches!(
        &out.records[0].enrichment,
        EnrichmentOutcome::Fallback { reason } if reason.contains("malformed")
    ));
}

#[tokio::test]
async fn mock_generator_marks_records_generated() {
    let e = Enricher::new(Arc::new(MockGenerator), 2, Duration::from_secs(1));
    let out = e.enrich(inputs()).await;
    assert_eq!(out.fallbacks, 0);
    assert_eq!(
        out.records[0].display_title,
        "Companies reincorporate in Nevada (mock)"
    );
    assert_eq!(out.records[0].summary, "Three firms filed.");
    assert_eq!(out.records[0].enrichment, EnrichmentOutcome::Generated);
}
