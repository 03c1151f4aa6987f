// src/dedupe.rs
//! Within-batch and cross-run deduplication by record fingerprint.

use std::collections::{BTreeSet, HashMap};

use metrics::counter;

use crate::ingest::types::NormalizedRecord;

/// Opaque set of fingerprints already delivered in earlier runs.
pub type SeenIds = BTreeSet<String>;

#[derive(Debug, Clone, Default)]
pub struct Deduped {
    pub records: Vec<NormalizedRecord>,
    /// Input set plus every surviving id; the caller decides whether to persist it.
    pub seen_ids: SeenIds,
    /// Dropped because another record in this batch had the same id.
    pub duplicates: usize,
    /// Dropped because the id was already in `seen_ids`.
    pub previously_seen: usize,
}

/// `cand` replaces `current` only if strictly earlier; timestamped beats untimestamped.
fn is_earlier(cand: &NormalizedRecord, current: &NormalizedRecord) -> bool {
    match (cand.timestamp, current.timestamp) {
        (Some(a), Some(b)) => a < b,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Keep one record per id: the earliest by timestamp, ties to the first seen.
/// The survivor takes the output slot of the first occurrence of its id.
pub fn dedupe(records: Vec<NormalizedRecord>, seen_ids: SeenIds) -> Deduped {
    let mut out = Deduped {
        records: Vec::with_capacity(records.len()),
        seen_ids,
        ..Deduped::default()
    };
    let mut slot: HashMap<String, usize> = HashMap::new();

    for r in records {
        if out.seen_ids.contains(&r.id) {
            out.previously_seen += 1;
            continue;
        }
        match slot.get(&r.id) {
            Some(&i) => {
                out.duplicates += 1;
                if is_earlier(&r, &out.records[i]) {
                    out.records[i] = r;
                }
            }
            None => {
                slot.insert(r.id.clone(), out.records.len());
                out.records.push(r);
            }
        }
    }

    out.seen_ids
        .extend(out.records.iter().map(|r| r.id.clone()));

    counter!("digest_duplicates_total").increment((out.duplicates + out.previously_seen) as u64);
    tracing::debug!(
        target: "pipeline",
        kept = out.records.len(),
        duplicates = out.duplicates,
        previously_seen = out.previously_seen,
        "dedupe"
    );
    out
}
