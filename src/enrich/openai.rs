// src/enrich/openai.rs
//! OpenAI Chat Completions generator. One call for the summary, and one for the
//! title only when the source title is not usable.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::fallback::title_is_usable;
use super::generator::{
    sanitize_generated, Generated, GenerationError, GenerationRequest, TextGenerator,
};

const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const TITLE_MAX_CHARS: usize = 120;
const SUMMARY_MAX_CHARS: usize = 600;

pub struct OpenAiGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
    topic: String,
    endpoint: String,
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}
#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}
#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}
#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}
#[derive(Deserialize)]
struct ChoiceMsg {
    content: Option<String>,
}

fn clip(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

impl OpenAiGenerator {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("mention-digest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            topic: topic.into(),
            endpoint: ENDPOINT.to_string(),
        }
    }

    /// Point at an OpenAI-compatible endpoint (proxies, local servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        if self.api_key.is_empty() {
            return Err(GenerationError::Disabled);
        }
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.3,
            max_tokens,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout
                } else {
                    GenerationError::Http(e.to_string())
                }
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::QuotaExceeded);
        }
        if !status.is_success() {
            return Err(GenerationError::Http(format!("status {status}")));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| GenerationError::Malformed("empty completion".into()))
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, req: &GenerationRequest) -> Result<Generated, GenerationError> {
        let content = if req.body.trim().is_empty() {
            req.title.as_str()
        } else {
            req.body.as_str()
        };

        let title = if title_is_usable(&req.title) {
            req.title.trim().to_string()
        } else {
            let system = format!("You are a news editor creating titles for {}.", self.topic);
            let user = format!(
                "Generate a clear, concise title (max 80 characters) for this content about {}:\n\nContent: {}\n\nTitle:",
                self.topic,
                clip(content, 500)
            );
            let raw = self.complete(&system, &user, 50).await?;
            sanitize_generated(&raw, TITLE_MAX_CHARS)
        };

        let system = format!(
            "You are a news editor creating concise summaries for {}.",
            self.topic
        );
        let user = format!(
            "Summarize this {} in 1-3 clear, concise sentences:\n\nContent: {}\n\nSummary:",
            self.topic,
            clip(content, 1000)
        );
        let raw = self.complete(&system, &user, 150).await?;
        let summary = sanitize_generated(&raw, SUMMARY_MAX_CHARS);

        if title.is_empty() || summary.is_empty() {
            return Err(GenerationError::Malformed("blank title or summary".into()));
        }
        Ok(Generated { title, summary })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
