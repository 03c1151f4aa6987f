// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of source kinds. Tagging and rendering match on this exhaustively.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Article,
    #[serde(alias = "x", alias = "twitter")]
    XPost,
    #[serde(alias = "linkedin")]
    LinkedIn,
}

impl SourceKind {
    /// Human-readable label shown in every digest rendering.
    pub fn tag(self) -> &'static str {
        match self {
            SourceKind::Article => "Article",
            SourceKind::XPost => "X Post",
            SourceKind::LinkedIn => "LinkedIn",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            SourceKind::Article => "📄",
            SourceKind::XPost => "🐦",
            SourceKind::LinkedIn => "💼",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Raw collector output. Immutable once built; lives for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceItem {
    pub source_kind: SourceKind,
    pub source: String, // collector name, e.g. "Google Alerts", "twitter_hashtag"
    pub raw_title: String,
    pub raw_body: String,
    pub url: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}

impl SourceItem {
    /// Minimal constructor used by collectors and tests; optional fields start empty.
    pub fn new(
        source_kind: SourceKind,
        source: impl Into<String>,
        raw_title: impl Into<String>,
        raw_body: impl Into<String>,
    ) -> Self {
        Self {
            source_kind,
            source: source.into(),
            raw_title: raw_title.into(),
            raw_body: raw_body.into(),
            url: None,
            author: None,
            published_at: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn published(mut self, at: DateTime<Utc>) -> Self {
        self.published_at = Some(at);
        self
    }
}

/// Uniform record produced by the normalizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub id: String,
    pub source_kind: SourceKind,
    pub source: String,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    pub author: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl NormalizedRecord {
    pub fn tag(&self) -> &'static str {
        self.source_kind.tag()
    }
}

/// One source of raw items (RSS feed, scraping export, ...).
/// A failing collector yields an error; the orchestrator logs it and carries on.
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self) -> Result<Vec<SourceItem>>;
    fn name(&self) -> &str;
    fn kind(&self) -> SourceKind;
}
