// src/ingest/providers/scrape.rs
//! Social-media scraping exports (PhantomBuster-style result sets) for X and LinkedIn.
//! Exports arrive either as JSON (array or `{"data": [..]}`) or as CSV with a header row.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use super::{http_client, within_window, DEFAULT_MAX_AGE_HOURS};
use crate::ingest::types::{Collector, SourceItem, SourceKind};

const TITLE_PREVIEW_CHARS: usize = 100;

// CSV header names per field, first non-empty column wins.
const TEXT_COLUMNS: &[&str] = &["text", "postContent", "content"];
const URL_COLUMNS: &[&str] = &["url", "postUrl", "tweetLink", "link"];
const TIMESTAMP_COLUMNS: &[&str] = &["timestamp", "date", "postDate", "postTimestamp"];
const AUTHOR_COLUMNS: &[&str] = &["author", "handle", "username", "profileName"];

#[derive(Debug, Deserialize)]
struct ScrapeRecord {
    #[serde(default, alias = "postContent", alias = "content")]
    text: String,
    #[serde(default, alias = "postUrl", alias = "tweetLink", alias = "link")]
    url: Option<String>,
    #[serde(default, alias = "date", alias = "postDate", alias = "postTimestamp")]
    timestamp: Option<String>,
    #[serde(default, alias = "handle", alias = "username", alias = "profileName")]
    author: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Payload {
    Records(Vec<ScrapeRecord>),
    Envelope { data: Vec<ScrapeRecord> },
}

fn parse_json_records(body: &str) -> serde_json::Result<Vec<ScrapeRecord>> {
    Ok(match serde_json::from_str(body)? {
        Payload::Records(v) => v,
        Payload::Envelope { data } => data,
    })
}

/// Header-driven CSV parse. Exports carry many more columns than we read,
/// and sometimes more than one candidate column for the same field.
fn parse_csv_records(body: &str) -> csv::Result<Vec<ScrapeRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());
    let headers = rdr.headers()?.clone();
    let column = |names: &[&str]| -> Vec<usize> {
        names
            .iter()
            .filter_map(|n| headers.iter().position(|h| h.eq_ignore_ascii_case(n)))
            .collect()
    };
    let (text, url, timestamp, author) = (
        column(TEXT_COLUMNS),
        column(URL_COLUMNS),
        column(TIMESTAMP_COLUMNS),
        column(AUTHOR_COLUMNS),
    );

    let mut out = Vec::new();
    for row in rdr.records() {
        let row = row?;
        let pick = |cols: &[usize]| {
            cols.iter()
                .filter_map(|&i| row.get(i))
                .find(|v| !v.is_empty())
                .map(str::to_string)
        };
        out.push(ScrapeRecord {
            text: pick(&text).unwrap_or_default(),
            url: pick(&url),
            timestamp: pick(&timestamp),
            author: pick(&author),
        });
    }
    Ok(out)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(n) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(n.and_utc());
        }
    }
    // date-only exports; month-first is tried before day-first
    for fmt in ["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"] {
        if let Some(n) = NaiveDate::parse_from_str(s, fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            return Some(n.and_utc());
        }
    }
    None
}

/// First `TITLE_PREVIEW_CHARS` of the post text, with an ellipsis when cut.
fn preview_title(text: &str) -> String {
    let t = text.trim();
    if t.chars().count() > TITLE_PREVIEW_CHARS {
        let mut s: String = t.chars().take(TITLE_PREVIEW_CHARS).collect();
        s.push_str("...");
        s
    } else {
        t.to_string()
    }
}

pub struct ScrapeCollector {
    name: String,
    kind: SourceKind,
    max_age: Duration,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        url: String,
        api_key: Option<String>,
        client: reqwest::Client,
    },
}

impl ScrapeCollector {
    pub fn from_url(
        name: impl Into<String>,
        kind: SourceKind,
        url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            max_age: Duration::hours(DEFAULT_MAX_AGE_HOURS),
            mode: Mode::Http {
                url: url.into(),
                api_key,
                client: http_client(),
            },
        }
    }

    pub fn from_fixture(name: impl Into<String>, kind: SourceKind, export: &str) -> Self {
        Self {
            name: name.into(),
            kind,
            max_age: Duration::hours(DEFAULT_MAX_AGE_HOURS),
            mode: Mode::Fixture(export.to_string()),
        }
    }

    pub fn with_max_age_hours(mut self, hours: i64) -> Self {
        self.max_age = Duration::hours(hours.max(1));
        self
    }

    /// JSON when the body opens with `[` or `{`, CSV otherwise.
    pub fn parse_export(&self, body: &str, now: DateTime<Utc>) -> Result<Vec<SourceItem>> {
        let trimmed = body.trim_start_matches('\u{feff}').trim_start();
        let records = if trimmed.starts_with('[') || trimmed.starts_with('{') {
            parse_json_records(trimmed)
                .with_context(|| format!("parsing JSON scrape export for {}", self.name))?
        } else {
            parse_csv_records(trimmed)
                .with_context(|| format!("parsing CSV scrape export for {}", self.name))?
        };

        let mut out = Vec::with_capacity(records.len());
        for r in records {
            let published = r.timestamp.as_deref().and_then(parse_timestamp);
            if !within_window(published, now, self.max_age) {
                continue;
            }
            out.push(SourceItem {
                source_kind: self.kind,
                source: self.name.clone(),
                raw_title: preview_title(&r.text),
                raw_body: r.text,
                url: r.url,
                author: r.author,
                published_at: published,
                fetched_at: now,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl Collector for ScrapeCollector {
    async fn collect(&self) -> Result<Vec<SourceItem>> {
        let now = Utc::now();
        match &self.mode {
            Mode::Fixture(s) => self.parse_export(s, now),
            Mode::Http {
                url,
                api_key,
                client,
            } => {
                let mut req = client.get(url.as_str());
                if let Some(key) = api_key {
                    req = req.header("X-Phantombuster-Key-1", key);
                }
                let resp = req
                    .send()
                    .await
                    .with_context(|| format!("{} http get()", self.name))?;
                if !resp.status().is_success() {
                    bail!("{} returned HTTP {}", self.name, resp.status());
                }
                let body = resp.text().await.context("scrape export .text()")?;
                self.parse_export(&body, now)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }
}
