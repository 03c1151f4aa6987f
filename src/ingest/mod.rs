// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::error::{PipelineError, PipelineResult};
use crate::ingest::types::{Collector, NormalizedRecord, SourceItem};
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use sha2::{Digest as _, Sha256};
use url::Url;

pub const TITLE_MAX_CHARS: usize = 300;
pub const BODY_MAX_CHARS: usize = 5_000;

/// Query parameters that only carry campaign/click tracking.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "mc_cid", "mc_eid", "igshid", "ref", "ref_src", "s", "si",
];

/// Clean collector text: strip tags, decode entities, strip tags that were
/// entity-encoded, fold quotes, collapse whitespace, cap length.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // Only real tag shapes; a bare `<` or `>` in prose is text.
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| {
        Regex::new(r"(?is)<!--.*?-->|</?[a-z][a-z0-9-]*(?:\s[^<>]*)?/?>").expect("tag regex")
    });

    // 1) Strip markup
    let stripped = re_tags.replace_all(s, "");

    // 2) HTML entity decode, then drop any markup that was escaped
    let decoded = html_escape::decode_html_entities(&stripped);
    let mut out = re_tags.replace_all(&decoded, "").into_owned();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. NBSP)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }

    out
}

fn is_tracking_param(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k.starts_with("utm_") || TRACKING_PARAMS.contains(&k.as_str())
}

/// Google Alerts wraps every link as `https://www.google.com/url?...&url=<target>`.
fn unwrap_redirect(u: &Url) -> Option<Url> {
    let host = u.host_str()?;
    if !(host == "google.com" || host.ends_with(".google.com")) || u.path() != "/url" {
        return None;
    }
    u.query_pairs()
        .find(|(k, _)| k == "url" || k == "q")
        .and_then(|(_, v)| Url::parse(&v).ok())
}

/// Canonical form of a URL used for fingerprinting.
/// Lower-cases scheme/host, drops fragment, default port and tracking params,
/// trims the trailing slash. Returns `None` for missing/blank input.
pub fn canonical_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut parsed = match Url::parse(trimmed) {
        Ok(u) => u,
        Err(_) => return Some(trimmed.trim_end_matches('/').to_ascii_lowercase()),
    };
    if let Some(target) = unwrap_redirect(&parsed) {
        parsed = target;
    }

    parsed.set_fragment(None);

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(&kept);
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }

    let mut out = parsed.to_string();
    if parsed.query().is_none() && out.ends_with('/') {
        out.pop();
    }
    Some(out)
}

/// Stable record id: SHA-256 over the canonical URL, or over the body when no URL exists.
pub fn fingerprint(url: Option<&str>, body: &str, title: &str) -> String {
    let material = match url.and_then(canonical_url) {
        Some(u) => format!("url:{u}"),
        None if !body.trim().is_empty() => format!("body:{}", body.trim()),
        None => format!("title:{}", title.trim()),
    };
    let digest = Sha256::digest(material.as_bytes());
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Output of [`normalize`]: surviving records plus the count of dropped empty items.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub records: Vec<NormalizedRecord>,
    pub malformed: usize,
}

/// Convert raw collector items into uniform records. Items whose cleaned title
/// AND body are empty are dropped and counted as malformed.
pub fn normalize(items: Vec<SourceItem>) -> Normalized {
    let mut out = Normalized {
        records: Vec::with_capacity(items.len()),
        malformed: 0,
    };

    for it in items {
        let title = normalize_text(&it.raw_title, TITLE_MAX_CHARS);
        let body = normalize_text(&it.raw_body, BODY_MAX_CHARS);
        if title.is_empty() && body.is_empty() {
            out.malformed += 1;
            continue;
        }

        let url = it
            .url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        let id = fingerprint(url.as_deref(), &body, &title);

        out.records.push(NormalizedRecord {
            id,
            source_kind: it.source_kind,
            source: it.source,
            title,
            body,
            url,
            author: it.author.filter(|a| !a.trim().is_empty()),
            timestamp: it.published_at,
        });
    }

    if out.malformed > 0 {
        tracing::warn!(target: "pipeline", malformed = out.malformed, "dropped empty items");
        counter!("digest_malformed_total").increment(out.malformed as u64);
    }
    out
}

/// Result of running every collector once.
#[derive(Debug, Default)]
pub struct Collected {
    pub items: Vec<SourceItem>,
    pub attempted: usize,
    pub failures: usize,
}

/// Run all collectors in order. A failing collector contributes zero items;
/// only a run where every collector failed is an error.
pub async fn collect_all(collectors: &[Box<dyn Collector>]) -> PipelineResult<Collected> {
    let mut out = Collected {
        attempted: collectors.len(),
        ..Collected::default()
    };

    for c in collectors {
        match c.collect().await {
            Ok(mut v) => {
                tracing::info!(target: "pipeline", collector = c.name(), items = v.len(), "collected");
                out.items.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(target: "pipeline", error = ?e, collector = c.name(), "collector error");
                counter!("digest_collector_errors_total").increment(1);
                out.failures += 1;
            }
        }
    }

    counter!("digest_collected_total").increment(out.items.len() as u64);

    if out.attempted > 0 && out.failures == out.attempted {
        return Err(PipelineError::AllCollectorsFailed(out.attempted));
    }
    Ok(out)
}
