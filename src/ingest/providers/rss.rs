use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use super::{http_client, within_window, DEFAULT_MAX_AGE_HOURS};
use crate::ingest::types::{Collector, SourceItem, SourceKind};

// --- RSS 2.0 ---
#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "dc:creator")]
    creator: Option<String>,
}

// --- Atom (Google Alerts) ---
#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entry: Vec<Entry>,
}
#[derive(Debug, Deserialize)]
struct Entry {
    title: Option<TextNode>,
    #[serde(default)]
    link: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    content: Option<TextNode>,
    summary: Option<TextNode>,
}
#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    text: String,
}
#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
}

fn from_unix(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(ts, 0)
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .and_then(|dt| from_unix(dt.unix_timestamp()))
}

fn parse_rfc3339(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc3339)
        .ok()
        .and_then(|dt| from_unix(dt.unix_timestamp()))
}

/// RSS/Atom feed collector (news articles, Google Alerts).
pub struct RssCollector {
    name: String,
    max_age: Duration,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssCollector {
    pub fn from_url(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_age: Duration::hours(DEFAULT_MAX_AGE_HOURS),
            mode: Mode::Http {
                url: url.into(),
                client: http_client(),
            },
        }
    }

    pub fn from_fixture(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            max_age: Duration::hours(DEFAULT_MAX_AGE_HOURS),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn with_max_age_hours(mut self, hours: i64) -> Self {
        self.max_age = Duration::hours(hours.max(1));
        self
    }

    /// Parse RSS 2.0 first, then Atom. Items outside the age window are skipped.
    pub fn parse_feed(&self, xml: &str, now: DateTime<Utc>) -> Result<Vec<SourceItem>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(xml);

        let mut out = Vec::new();
        if let Ok(rss) = from_str::<Rss>(&xml_clean) {
            for it in rss.channel.item {
                let published = it.pub_date.as_deref().and_then(parse_rfc2822);
                if !within_window(published, now, self.max_age) {
                    continue;
                }
                out.push(SourceItem {
                    source_kind: SourceKind::Article,
                    source: self.name.clone(),
                    raw_title: it.title.unwrap_or_default(),
                    raw_body: it.description.unwrap_or_default(),
                    url: it.link,
                    author: it.creator,
                    published_at: published,
                    fetched_at: now,
                });
            }
        } else {
            let feed: Feed = from_str(&xml_clean)
                .with_context(|| format!("parsing feed xml for {}", self.name))?;
            for e in feed.entry {
                let published = e
                    .published
                    .as_deref()
                    .or(e.updated.as_deref())
                    .and_then(parse_rfc3339);
                if !within_window(published, now, self.max_age) {
                    continue;
                }
                let body = e.content.or(e.summary).map(|t| t.text).unwrap_or_default();
                out.push(SourceItem {
                    source_kind: SourceKind::Article,
                    source: self.name.clone(),
                    raw_title: e.title.map(|t| t.text).unwrap_or_default(),
                    raw_body: body,
                    url: e.link.into_iter().next().map(|l| l.href),
                    author: None,
                    published_at: published,
                    fetched_at: now,
                });
            }
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("digest_feed_parse_ms").record(ms);
        Ok(out)
    }
}

#[async_trait]
impl Collector for RssCollector {
    async fn collect(&self) -> Result<Vec<SourceItem>> {
        let now = Utc::now();
        match &self.mode {
            Mode::Fixture(s) => self.parse_feed(s, now),
            Mode::Http { url, client } => {
                let body = match client.get(url.as_str()).send().await {
                    Ok(resp) => resp
                        .error_for_status()
                        .with_context(|| format!("{} http status", self.name))?
                        .text()
                        .await
                        .with_context(|| format!("{} http .text()", self.name))?,
                    Err(e) => {
                        counter!("digest_collector_http_errors_total").increment(1);
                        return Err(e).with_context(|| format!("{} http get()", self.name));
                    }
                };
                self.parse_feed(&body, now)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Article
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
