use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::ChannelSender;
use crate::digest::Digest;

/// Discord caps a webhook message at 10 embeds.
const EMBEDS_PER_MESSAGE: usize = 10;
/// ...and at 6000 characters across all embed text in one message.
const EMBED_CHARS_PER_MESSAGE: usize = 6000;

#[derive(Clone)]
pub struct DiscordNotifier {
    name: String,
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(name: impl Into<String>, webhook: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            webhook: webhook.into(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    /// Split the digest into webhook messages, heading embed first. A message
    /// closes when it holds `EMBEDS_PER_MESSAGE` embeds or the next embed would
    /// push its text past `EMBED_CHARS_PER_MESSAGE`.
    pub fn payloads(digest: &Digest) -> Vec<DiscordWebhookPayload> {
        let mut out = Vec::new();
        let mut embeds: Vec<Value> = Vec::new();
        let mut chars = 0;
        for embed in digest.render_discord_embeds() {
            let n = embed_chars(&embed);
            if !embeds.is_empty()
                && (embeds.len() == EMBEDS_PER_MESSAGE || chars + n > EMBED_CHARS_PER_MESSAGE)
            {
                out.push(DiscordWebhookPayload {
                    content: None,
                    embeds: std::mem::take(&mut embeds),
                });
                chars = 0;
            }
            chars += n;
            embeds.push(embed);
        }
        if !embeds.is_empty() {
            out.push(DiscordWebhookPayload {
                content: None,
                embeds,
            });
        }
        out
    }

    /// Transport errors and non-2xx responses are retried with exponential backoff.
    async fn post_with_retry(&self, payload: &DiscordWebhookPayload) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("Discord webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("Discord webhook request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tracing::debug!(target: "notify", attempt, error = %err, "discord retry");
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

#[async_trait::async_trait]
impl ChannelSender for DiscordNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, digest: &Digest) -> Result<()> {
        for payload in Self::payloads(digest) {
            self.post_with_retry(&payload).await?;
        }
        Ok(())
    }
}

/// Characters Discord counts toward the per-message total for our embeds.
fn embed_chars(embed: &Value) -> usize {
    [&embed["title"], &embed["description"], &embed["footer"]["text"]]
        .into_iter()
        .filter_map(Value::as_str)
        .map(|s| s.chars().count())
        .sum()
}

#[derive(Debug, Serialize)]
pub struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<Value>,
}
