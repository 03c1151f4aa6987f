// src/digest/mod.rs
//! Digest assembly. Ordering happens here, once; every renderer in `render`
//! reads the same `Digest` value.

pub mod render;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enrich::EnrichedRecord;

pub const EMPTY_DIGEST_TEXT: &str = "No relevant items found today.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Digest {
    pub title: String,
    pub generated_at: DateTime<Utc>,
    pub item_count: usize,
    pub records: Vec<EnrichedRecord>,
}

impl Digest {
    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    /// "October 15, 2026"
    pub fn date_label(&self) -> String {
        self.generated_at.format("%B %d, %Y").to_string()
    }
}

/// Newest first; records without a timestamp go last in input order.
/// `sort_by` is stable, so equal timestamps also keep input order.
pub fn assemble(
    mut records: Vec<EnrichedRecord>,
    generated_at: DateTime<Utc>,
    title: impl Into<String>,
) -> Digest {
    records.sort_by(|a, b| match (a.record.timestamp, b.record.timestamp) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    tracing::debug!(target: "pipeline", items = records.len(), "digest assembled");
    Digest {
        title: title.into(),
        generated_at,
        item_count: records.len(),
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{NormalizedRecord, SourceKind};
    use chrono::TimeZone;

    fn er(id: &str, ts: Option<i64>) -> EnrichedRecord {
        EnrichedRecord::fallback(
            NormalizedRecord {
                id: id.into(),
                source_kind: SourceKind::Article,
                source: "feed".into(),
                title: format!("Title {id}"),
                body: String::new(),
                url: None,
                author: None,
                timestamp: ts.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
            },
            "test",
        )
    }

    #[test]
    fn equal_timestamps_keep_input_order() {
        let d = assemble(
            vec![er("a", Some(5)), er("b", None), er("c", Some(5)), er("d", None)],
            Utc::now(),
            "Digest",
        );
        let ids: Vec<_> = d.records.iter().map(|r| r.record.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b", "d"]);
        assert_eq!(d.item_count, 4);
    }

    #[test]
    fn empty_input_is_not_an_error() {
        let d = assemble(Vec::new(), Utc::now(), "Digest");
        assert!(d.is_empty());
    }
}
