// src/relevance.rs
//! Keyword relevance gate: a record passes if any configured keyword occurs
//! (case-insensitive substring) in its title or body.

use metrics::counter;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::ingest::types::NormalizedRecord;

/// Validated, non-empty keyword list. Stores lowercase needles next to the originals.
#[derive(Debug, Clone)]
pub struct KeywordSet {
    keywords: Vec<(String, String)>,
}

impl KeywordSet {
    /// Trims, drops blanks, de-duplicates case-insensitively (first spelling wins).
    /// An empty result is a configuration error.
    pub fn new<I, S>(keywords: I) -> PipelineResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<(String, String)> = Vec::new();
        for k in keywords {
            let t = k.as_ref().trim();
            if t.is_empty() {
                continue;
            }
            let lower = t.to_lowercase();
            if out.iter().any(|(_, l)| *l == lower) {
                continue;
            }
            out.push((t.to_string(), lower));
        }
        if out.is_empty() {
            return Err(PipelineError::config("keyword list is empty"));
        }
        Ok(Self { keywords: out })
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Original spellings of the keywords found in `record`.
    pub fn matched_keywords(&self, record: &NormalizedRecord) -> Vec<&str> {
        let title = record.title.to_lowercase();
        let body = record.body.to_lowercase();
        self.keywords
            .iter()
            .filter(|(_, l)| title.contains(l.as_str()) || body.contains(l.as_str()))
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn matches(&self, record: &NormalizedRecord) -> bool {
        let title = record.title.to_lowercase();
        let body = record.body.to_lowercase();
        self.keywords
            .iter()
            .any(|(_, l)| title.contains(l.as_str()) || body.contains(l.as_str()))
    }
}

/// Keep records that match at least one keyword. Input order is preserved.
pub fn filter(records: Vec<NormalizedRecord>, keywords: &KeywordSet) -> Vec<NormalizedRecord> {
    let total = records.len();
    let kept: Vec<NormalizedRecord> = records
        .into_iter()
        .filter(|r| {
            let hit = keywords.matches(r);
            if hit {
                debug!(target: "pipeline", id = %r.id, matched = ?keywords.matched_keywords(r), "relevant");
            }
            hit
        })
        .collect();

    counter!("digest_filtered_total").increment((total - kept.len()) as u64);
    tracing::info!(target: "pipeline", kept = kept.len(), total, "keyword filter");
    kept
}

/// Convenience wrapper over raw configuration: fails fast on an empty list.
pub fn filter_records(
    records: Vec<NormalizedRecord>,
    keywords: &[String],
) -> PipelineResult<Vec<NormalizedRecord>> {
    let set = KeywordSet::new(keywords)?;
    Ok(filter(records, &set))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::SourceKind;

    fn rec(title: &str, body: &str) -> NormalizedRecord {
        NormalizedRecord {
            id: format!("{title}|{body}"),
            source_kind: SourceKind::Article,
            source: "t".into(),
            title: title.into(),
            body: body.into(),
            url: None,
            author: None,
            timestamp: None,
        }
    }

    #[test]
    fn empty_or_blank_keywords_is_config_error() {
        let e = KeywordSet::new(Vec::<String>::new()).unwrap_err();
        assert!(e.is_config());
        assert!(KeywordSet::new(["  ", ""]).unwrap_err().is_config());
        assert!(filter_records(vec![rec("a", "b")], &[]).unwrap_err().is_config());
    }

    #[test]
    fn match_is_case_insensitive_on_title_or_body() {
        let ks = KeywordSet::new(["Court of Chancery", "LeaveDelaware"]).unwrap();
        let out = filter(
            vec![
                rec("DELAWARE COURT OF CHANCERY rules", ""),
                rec("Weather", "tagged #leavedelaware today"),
                rec("Sports", "nothing here"),
            ],
            &ks,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "DELAWARE COURT OF CHANCERY rules");
    }

    #[test]
    fn keywords_dedupe_case_insensitively() {
        let ks = KeywordSet::new(["Delaware", " delaware ", "Texas"]).unwrap();
        assert_eq!(ks.len(), 2);
        assert_eq!(ks.matched_keywords(&rec("delaware to texas", "")), vec!["Delaware", "Texas"]);
    }
}
