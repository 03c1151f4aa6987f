// src/enrich/generator.rs
//! Text-generation capability: the seam between the enricher and any AI provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Input for one generation call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Record fingerprint; also the cache key.
    pub id: String,
    pub title: String,
    pub body: String,
}

/// Generated display title + 1–3 sentence summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Generated {
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation timed out")]
    Timeout,
    #[error("generation quota exceeded")]
    QuotaExceeded,
    #[error("malformed generation response: {0}")]
    Malformed(String),
    #[error("generation request failed: {0}")]
    Http(String),
    #[error("generation disabled")]
    Disabled,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, req: &GenerationRequest) -> Result<Generated, GenerationError>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Always fails with `Disabled`; every record takes the heuristic fallback.
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _req: &GenerationRequest) -> Result<Generated, GenerationError> {
        Err(GenerationError::Disabled)
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic generator for tests/local runs: echoes a prefix of the input.
#[derive(Clone, Default)]
pub struct MockGenerator;

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, req: &GenerationRequest) -> Result<Generated, GenerationError> {
        let title = if req.title.is_empty() {
            "Untitled mention (mock)".to_string()
        } else {
            format!("{} (mock)", req.title)
        };
        let summary = super::fallback::first_sentences(&req.body, 1);
        Ok(Generated {
            title,
            summary: if summary.is_empty() {
                "Summary unavailable (mock).".to_string()
            } else {
                summary
            },
        })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Collapse to a single line, strip wrapping quotes and "Title:"-style prefixes, cap length.
pub fn sanitize_generated(input: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_chars));
    let mut prev_space = false;
    for ch in input.chars() {
        let c = if ch.is_whitespace() { ' ' } else { ch };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    let unquote = |s: &str| -> String {
        s.trim_matches(|c| c == '"' || c == '\'' || c == '*')
            .trim()
            .to_string()
    };
    let mut owned = unquote(&out);
    for prefix in ["Title:", "Summary:"] {
        let head_matches = owned
            .get(..prefix.len())
            .is_some_and(|h| h.eq_ignore_ascii_case(prefix));
        if head_matches {
            owned = unquote(&owned[prefix.len()..]);
        }
    }
    let s = owned.as_str();
    if s.chars().count() > max_chars {
        s.chars()
            .take(max_chars)
            .collect::<String>()
            .trim_end()
            .to_string()
    } else {
        s.to_string()
    }
}
