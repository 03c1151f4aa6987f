// tests/dispatch_isolation.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mention_digest::{assemble, dispatch, ChannelSender, DeliveryStatus, Digest};
use parking_lot::Mutex;

/// Records every digest it was asked to send.
#[derive(Default)]
struct Recording {
    sent: Mutex<Vec<usize>>,
}

#[async_trait]
impl ChannelSender for Recording {
    fn name(&self) -> &str {
        "recording"
    }
    async fn send(&self, digest: &Digest) -> anyhow::Result<()> {
        self.sent.lock().push(digest.item_count);
        Ok(())
    }
}

struct AlwaysFails;

#[async_trait]
impl ChannelSender for AlwaysFails {
    fn name(&self) -> &str {
        "always-fails"
    }
    async fn send(&self, _digest: &Digest) -> anyhow::Result<()> {
        anyhow::bail!("webhook returned 500")
    }
}

struct Hangs;

#[async_trait]
impl ChannelSender for Hangs {
    fn name(&self) -> &str {
        "hangs"
    }
    async fn send(&self, _digest: &Digest) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

fn digest() -> Digest {
    assemble(Vec::new(), Utc::now(), "Digest")
}

#[tokio::test]
async fn failing_channel_does_not_stop_the_other() {
    let ok = Arc::new(Recording::default());
    // failing channel first: no short-circuit
    let channels: Vec<Arc<dyn ChannelSender>> = vec![Arc::new(AlwaysFails), ok.clone()];

    let res = dispatch(&digest(), &channels, Duration::from_secs(5)).await;

    assert_eq!(res.len(), 2);
    assert_eq!(res[0].status, DeliveryStatus::Failed);
    assert!(res[0].error.as_deref().unwrap().contains("500"));
    assert_eq!(res[1].status, DeliveryStatus::Sent);
    assert!(res[1].error.is_none());
    assert_eq!(ok.sent.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn hung_channel_is_bounded_by_timeout() {
    let ok = Arc::new(Recording::default());
    let channels: Vec<Arc<dyn ChannelSender>> = vec![Arc::new(Hangs), ok.clone()];

    let res = dispatch(&digest(), &channels, Duration::from_secs(2)).await;

    assert_eq!(res[0].channel_name, "hangs");
    assert_eq!(res[0].status, DeliveryStatus::Failed);
    assert!(res[0].error.as_deref().unwrap().contains("timed out"));
    assert_eq!(res[1].status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn no_channels_no_results() {
    let res = dispatch(&digest(), &[], Duration::from_secs(1)).await;
    assert!(res.is_empty());
}
