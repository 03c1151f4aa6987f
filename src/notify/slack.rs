use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

use super::ChannelSender;
use crate::digest::Digest;

/// Incoming-webhook sender. Posts Block Kit with the plain text as the
/// notification fallback.
pub struct SlackNotifier {
    name: String,
    webhook_url: String,
    client: Client,
    timeout: Duration,
}

impl SlackNotifier {
    pub fn new(name: impl Into<String>, webhook_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            webhook_url: webhook_url.into(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }

    pub fn payload(digest: &Digest) -> serde_json::Value {
        serde_json::json!({
            "text": digest.heading(),
            "blocks": digest.render_slack_blocks(),
        })
    }
}

#[async_trait::async_trait]
impl ChannelSender for SlackNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, digest: &Digest) -> Result<()> {
        self.client
            .post(&self.webhook_url)
            .timeout(self.timeout)
            .json(&Self::payload(digest))
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        tracing::debug!(target: "notify", blocks = digest.records.len(), "slack webhook accepted");
        Ok(())
    }
}
