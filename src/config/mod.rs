// src/config/mod.rs
//! Run configuration. Loaded once per run, resolved (env references) and
//! validated before any external call, then threaded through the stages.

pub mod load;

use std::path::PathBuf;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::ingest::types::SourceKind;
use crate::relevance::KeywordSet;

pub use load::{load_default, load_from, DEFAULT_CONFIG_PATHS, ENV_CONFIG_PATH};

fn default_title() -> String {
    "Daily Mentions Digest".to_string()
}
fn default_true() -> bool {
    true
}
fn default_provider() -> String {
    "openai".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_topic() -> String {
    "business and corporate news".to_string()
}
fn default_daily_limit() -> u32 {
    200
}
fn default_concurrency() -> usize {
    4
}
fn default_enrich_timeout() -> u64 {
    20
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/enrich")
}
fn default_delivery_timeout() -> u64 {
    30
}
fn default_seen_path() -> PathBuf {
    PathBuf::from("state/seen_ids.json")
}
fn default_lock_path() -> PathBuf {
    PathBuf::from("state/run.lock")
}
fn default_schedule_at() -> String {
    "09:45".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    pub digest: DigestSection,
    #[serde(default)]
    pub enrich: EnrichConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub collectors: Vec<CollectorConfig>,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestSection {
    /// Heading used by every rendering.
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// "openai" | "mock" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Subject matter mentioned in prompts, e.g. "Delaware business/corporate news".
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_enrich_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Chat-completions URL override for OpenAI-compatible gateways.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_provider(),
            api_key: default_api_key(),
            model: default_model(),
            topic: default_topic(),
            daily_limit: default_daily_limit(),
            concurrency: default_concurrency(),
            timeout_secs: default_enrich_timeout(),
            cache_dir: default_cache_dir(),
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Upper bound for one channel's send, in seconds.
    #[serde(default = "default_delivery_timeout")]
    pub timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_delivery_timeout(),
        }
    }
}

/// One delivery target. String values of the form `env:VAR` are read from the environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChannelConfig {
    Slack {
        #[serde(default)]
        name: Option<String>,
        webhook_url: String,
        /// Per-request HTTP timeout; the notifier default applies when unset.
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    Discord {
        #[serde(default)]
        name: Option<String>,
        webhook_url: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
        /// Attempts per message, counting the first.
        #[serde(default)]
        retries: Option<u8>,
    },
    Email {
        #[serde(default)]
        name: Option<String>,
        smtp_host: String,
        smtp_user: String,
        smtp_pass: String,
        from: String,
        to: Vec<String>,
    },
    Log {
        #[serde(default)]
        name: Option<String>,
    },
}

impl ChannelConfig {
    pub fn name(&self) -> String {
        let (name, kind) = match self {
            ChannelConfig::Slack { name, .. } => (name, "slack"),
            ChannelConfig::Discord { name, .. } => (name, "discord"),
            ChannelConfig::Email { name, .. } => (name, "email"),
            ChannelConfig::Log { name } => (name, "log"),
        };
        name.clone().unwrap_or_else(|| kind.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CollectorConfig {
    Rss {
        name: String,
        url: String,
        #[serde(default)]
        max_age_hours: Option<i64>,
    },
    Scrape {
        name: String,
        source_kind: SourceKind,
        url: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        max_age_hours: Option<i64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_seen_path")]
    pub seen_path: PathBuf,
    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            seen_path: default_seen_path(),
            lock_path: default_lock_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Local wall-clock time, "HH:MM".
    #[serde(default = "default_schedule_at")]
    pub at: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            at: default_schedule_at(),
        }
    }
}

impl ScheduleConfig {
    pub fn time_of_day(&self) -> PipelineResult<NaiveTime> {
        NaiveTime::parse_from_str(self.at.trim(), "%H:%M")
            .map_err(|e| PipelineError::config(format!("schedule.at `{}`: {e}", self.at)))
    }
}

/// `env:VAR` → value of VAR (missing/blank is a config error); anything else is literal.
fn resolve_value(field: &str, raw: &str) -> PipelineResult<String> {
    let t = raw.trim();
    let Some(var) = t
        .get(..4)
        .filter(|p| p.eq_ignore_ascii_case("env:"))
        .map(|_| t[4..].trim())
    else {
        return Ok(t.to_string());
    };
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(PipelineError::config(format!(
            "{field}: environment variable {var} is not set"
        ))),
    }
}

fn require(field: &str, v: &str) -> PipelineResult<()> {
    if v.trim().is_empty() {
        return Err(PipelineError::config(format!("{field} is empty")));
    }
    Ok(())
}

impl DigestConfig {
    pub fn keyword_set(&self) -> PipelineResult<KeywordSet> {
        KeywordSet::new(&self.digest.keywords)
    }

    /// Resolve `env:` references and the AI key, then validate. Returns the
    /// ready-to-use copy; the original keeps the unresolved references.
    pub fn resolved(&self) -> PipelineResult<DigestConfig> {
        let mut cfg = self.clone();

        cfg.enrich.provider = cfg.enrich.provider.trim().to_lowercase();
        if cfg.enrich.enabled && cfg.enrich.provider == "openai" {
            cfg.enrich.api_key = if cfg.enrich.api_key.trim().eq_ignore_ascii_case("env") {
                match std::env::var("OPENAI_API_KEY") {
                    Ok(k) if !k.trim().is_empty() => k.trim().to_string(),
                    _ => return Err(PipelineError::config("Missing OPENAI_API_KEY env var")),
                }
            } else {
                resolve_value("enrich.api_key", &cfg.enrich.api_key)?
            };
        }

        for ch in cfg.channels.iter_mut() {
            let label = ch.name();
            match ch {
                ChannelConfig::Slack { webhook_url, .. }
                | ChannelConfig::Discord { webhook_url, .. } => {
                    *webhook_url = resolve_value(&format!("{label}.webhook_url"), webhook_url)?;
                }
                ChannelConfig::Email {
                    smtp_host,
                    smtp_user,
                    smtp_pass,
                    from,
                    to,
                    ..
                } => {
                    *smtp_host = resolve_value(&format!("{label}.smtp_host"), smtp_host)?;
                    *smtp_user = resolve_value(&format!("{label}.smtp_user"), smtp_user)?;
                    *smtp_pass = resolve_value(&format!("{label}.smtp_pass"), smtp_pass)?;
                    *from = resolve_value(&format!("{label}.from"), from)?;
                    let mut resolved = Vec::new();
                    for t in to.iter() {
                        // env values may hold a comma-separated recipient list
                        let v = resolve_value(&format!("{label}.to"), t)?;
                        resolved.extend(
                            v.split(',')
                                .map(str::trim)
                                .filter(|s| !s.is_empty())
                                .map(str::to_string),
                        );
                    }
                    *to = resolved;
                }
                ChannelConfig::Log { .. } => {}
            }
        }

        for c in cfg.collectors.iter_mut() {
            match c {
                CollectorConfig::Rss { name, url, .. } => {
                    *url = resolve_value(&format!("{name}.url"), url)?;
                }
                CollectorConfig::Scrape {
                    name, url, api_key, ..
                } => {
                    *url = resolve_value(&format!("{name}.url"), url)?;
                    if let Some(k) = api_key.as_mut() {
                        *k = resolve_value(&format!("{name}.api_key"), k)?;
                    }
                }
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Fail-fast checks; no network or disk access.
    pub fn validate(&self) -> PipelineResult<()> {
        self.keyword_set()?;

        if self.channels.is_empty() {
            return Err(PipelineError::config("no delivery channels configured"));
        }
        let mut names = std::collections::BTreeSet::new();
        for ch in &self.channels {
            let label = ch.name();
            if !names.insert(label.clone()) {
                return Err(PipelineError::config(format!(
                    "duplicate channel name `{label}`"
                )));
            }
            match ch {
                ChannelConfig::Slack { webhook_url, .. }
                | ChannelConfig::Discord { webhook_url, .. } => {
                    require(&format!("{label}.webhook_url"), webhook_url)?;
                }
                ChannelConfig::Email {
                    smtp_host,
                    from,
                    to,
                    ..
                } => {
                    require(&format!("{label}.smtp_host"), smtp_host)?;
                    require(&format!("{label}.from"), from)?;
                    if to.iter().all(|t| t.trim().is_empty()) {
                        return Err(PipelineError::config(format!("{label}.to has no recipients")));
                    }
                }
                ChannelConfig::Log { .. } => {}
            }
        }

        if self.enrich.concurrency == 0 {
            return Err(PipelineError::config("enrich.concurrency must be >= 1"));
        }
        if self.enrich.timeout_secs == 0 || self.delivery.timeout_secs == 0 {
            return Err(PipelineError::config("timeouts must be >= 1 second"));
        }
        self.schedule.time_of_day()?;
        Ok(())
    }
}
