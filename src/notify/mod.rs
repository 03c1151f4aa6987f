// src/notify/mod.rs
//! Delivery: one `ChannelSender` per target, dispatched independently.

pub mod discord;
pub mod email;
pub mod slack;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ChannelConfig;
use crate::digest::Digest;
use crate::error::PipelineResult;

pub use discord::DiscordNotifier;
pub use email::EmailSender;
pub use slack::SlackNotifier;

#[async_trait::async_trait]
pub trait ChannelSender: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, digest: &Digest) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryResult {
    pub channel_name: String,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn is_sent(&self) -> bool {
        self.status == DeliveryStatus::Sent
    }
}

/// Send to every channel concurrently. Each send is bounded by `timeout`; a
/// failure or timeout is recorded for that channel only. No retries here.
pub async fn dispatch(
    digest: &Digest,
    channels: &[Arc<dyn ChannelSender>],
    timeout: Duration,
) -> Vec<DeliveryResult> {
    let sends = channels.iter().map(move |ch| async move {
        let outcome = tokio::time::timeout(timeout, ch.send(digest)).await;
        let (status, error) = match outcome {
            Ok(Ok(())) => (DeliveryStatus::Sent, None),
            Ok(Err(e)) => (DeliveryStatus::Failed, Some(format!("{e:#}"))),
            Err(_) => (
                DeliveryStatus::Failed,
                Some(format!("timed out after {}s", timeout.as_secs_f32())),
            ),
        };
        match &error {
            None => info!(target: "notify", channel = ch.name(), items = digest.item_count, "digest delivered"),
            Some(e) => warn!(target: "notify", channel = ch.name(), error = %e, "delivery failed"),
        }
        metrics::counter!(
            "digest_delivery_total",
            "channel" => ch.name().to_string(),
            "status" => status.as_str()
        )
        .increment(1);
        DeliveryResult {
            channel_name: ch.name().to_string(),
            status,
            error,
        }
    });
    futures::future::join_all(sends).await
}

/// Writes the plain-text digest to the log. Used for dry runs and as a
/// zero-config channel.
pub struct LogSender {
    name: String,
}

impl LogSender {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait::async_trait]
impl ChannelSender for LogSender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, digest: &Digest) -> Result<()> {
        info!(target: "notify", channel = %self.name, "\n{}", digest.render_text());
        Ok(())
    }
}

/// Build senders from resolved channel config.
pub fn build_channels(cfgs: &[ChannelConfig]) -> PipelineResult<Vec<Arc<dyn ChannelSender>>> {
    let mut out: Vec<Arc<dyn ChannelSender>> = Vec::with_capacity(cfgs.len());
    for cfg in cfgs {
        let name = cfg.name();
        let sender: Arc<dyn ChannelSender> = match cfg {
            ChannelConfig::Slack {
                webhook_url,
                timeout_secs,
                ..
            } => {
                let mut n = SlackNotifier::new(name, webhook_url.clone());
                if let Some(secs) = timeout_secs {
                    n = n.with_timeout(*secs);
                }
                Arc::new(n)
            }
            ChannelConfig::Discord {
                webhook_url,
                timeout_secs,
                retries,
                ..
            } => {
                let mut n = DiscordNotifier::new(name, webhook_url.clone());
                if let Some(secs) = timeout_secs {
                    n = n.with_timeout(*secs);
                }
                if let Some(r) = retries {
                    n = n.with_retries(*r);
                }
                Arc::new(n)
            }
            ChannelConfig::Email {
                smtp_host,
                smtp_user,
                smtp_pass,
                from,
                to,
                ..
            } => Arc::new(EmailSender::new(name, smtp_host, smtp_user, smtp_pass, from, to)?),
            ChannelConfig::Log { .. } => Arc::new(LogSender::new(name)),
        };
        out.push(sender);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::assemble;
    use chrono::Utc;

    struct Broken;

    #[async_trait::async_trait]
    impl ChannelSender for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        async fn send(&self, _d: &Digest) -> Result<()> {
            anyhow::bail!("smtp refused")
        }
    }

    #[tokio::test]
    async fn one_result_per_channel_in_order() {
        let d = assemble(Vec::new(), Utc::now(), "Digest");
        let chans: Vec<Arc<dyn ChannelSender>> =
            vec![Arc::new(Broken), Arc::new(LogSender::new("log"))];
        let res = dispatch(&d, &chans, Duration::from_secs(1)).await;
        assert_eq!(res.len(), 2);
        assert_eq!(res[0].channel_name, "broken");
        assert_eq!(res[0].status, DeliveryStatus::Failed);
        assert_eq!(res[0].error.as_deref(), Some("smtp refused"));
        assert!(res[1].is_sent());
    }

    #[test]
    fn builds_senders_from_config() {
        let cfgs = vec![
            ChannelConfig::Log { name: None },
            ChannelConfig::Slack {
                name: Some("team".into()),
                webhook_url: "https://hooks.slack.test/x".into(),
                timeout_secs: Some(3),
            },
            ChannelConfig::Discord {
                name: None,
                webhook_url: "https://discord.test/api/webhooks/1/x".into(),
                timeout_secs: None,
                retries: Some(0),
            },
        ];
        let chans = build_channels(&cfgs).unwrap();
        let names: Vec<_> = chans.iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["log", "team", "discord"]);
    }
}
