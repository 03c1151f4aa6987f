use anyhow::{Context, Result};
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::ChannelSender;
use crate::digest::Digest;
use crate::error::{PipelineError, PipelineResult};

/// SMTP sender (STARTTLS relay). One message per recipient, text + HTML alternatives.
pub struct EmailSender {
    name: String,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailSender {
    pub fn new(
        name: impl Into<String>,
        host: &str,
        user: &str,
        pass: &str,
        from: &str,
        to: &[String],
    ) -> PipelineResult<Self> {
        let name = name.into();
        let creds = Credentials::new(user.to_string(), pass.to_string());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| PipelineError::config(format!("{name}.smtp_host `{host}`: {e}")))?
            .credentials(creds)
            .build();

        let from = from
            .parse::<Mailbox>()
            .map_err(|e| PipelineError::config(format!("{name}.from `{from}`: {e}")))?;
        let to = to
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>()
                    .map_err(|e| PipelineError::config(format!("{name}.to `{addr}`: {e}")))
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        Ok(Self {
            name,
            mailer,
            from,
            to,
        })
    }

    pub fn subject(digest: &Digest) -> String {
        format!("{} ({} items)", digest.heading(), digest.item_count)
    }

    fn build_message(&self, to: &Mailbox, digest: &Digest) -> Result<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(to.clone())
            .subject(Self::subject(digest))
            .multipart(MultiPart::alternative_plain_html(
                digest.render_text(),
                digest.render_html(),
            ))
            .context("build email")
    }
}

#[async_trait::async_trait]
impl ChannelSender for EmailSender {
    fn name(&self) -> &str {
        &self.name
    }

    /// Fails if any recipient fails; the error lists which ones.
    async fn send(&self, digest: &Digest) -> Result<()> {
        let mut failed = Vec::new();
        for to in &self.to {
            let msg = self.build_message(to, digest)?;
            if let Err(e) = self.mailer.send(msg).await {
                tracing::warn!(target: "notify", recipient = %to, error = %e, "email send failed");
                failed.push(to.to_string());
            }
        }
        if !failed.is_empty() {
            anyhow::bail!(
                "email failed for {}/{} recipients: {}",
                failed.len(),
                self.to.len(),
                failed.join(", ")
            );
        }
        Ok(())
    }
}
