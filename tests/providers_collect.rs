// tests/providers_collect.rs
use chrono::{Duration, Utc};
use mention_digest::ingest::collect_all;
use mention_digest::ingest::providers::rss::RssCollector;
use mention_digest::ingest::providers::scrape::ScrapeCollector;
use mention_digest::{Collector, PipelineError, SourceKind};

fn rss_fixture() -> String {
    let fresh = (Utc::now() - Duration::hours(2)).to_rfc2822();
    let stale = (Utc::now() - Duration::days(3)).to_rfc2822();
    format!(
        r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Alerts</title>
<item><title>Another company leaves Delaware</title><link>https://news.example.com/a?utm_source=rss</link>
<pubDate>{fresh}</pubDate><description>&lt;p&gt;Board approves &amp;amp; files.&lt;/p&gt;</description></item>
<item><title>Old Delaware story</title><link>https://news.example.com/old</link>
<pubDate>{stale}</pubDate><description>stale</description></item>
</channel></rss>"#
    )
}

fn x_fixture() -> String {
    let fresh = (Utc::now() - Duration::hours(1)).to_rfc3339();
    format!(
        r#"[{{"text": "We are moving our HQ out of Delaware. #LeaveDelaware", "tweetLink": "https://x.com/acme/status/42", "timestamp": "{fresh}", "handle": "@acme"}}]"#
    )
}

#[tokio::test]
async fn fixtures_flow_through_collectors() {
    let rss = rss_fixture();
    let x = x_fixture();
    let collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(RssCollector::from_fixture("Google Alerts", &rss)),
        Box::new(ScrapeCollector::from_fixture("twitter_hashtag", SourceKind::XPost, &x)),
    ];

    let got = collect_all(&collectors).await.unwrap();
    assert_eq!(got.attempted, 2);
    assert_eq!(got.failures, 0);
    assert_eq!(got.items.len(), 2, "stale RSS item is outside the window");

    assert_eq!(got.items[0].source, "Google Alerts");
    assert_eq!(got.items[0].source_kind, SourceKind::Article);
    assert_eq!(got.items[1].source_kind, SourceKind::XPost);
    assert_eq!(got.items[1].author.as_deref(), Some("@acme"));
}

#[tokio::test]
async fn one_broken_source_yields_zero_items_not_an_abort() {
    let x = x_fixture();
    let collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(ScrapeCollector::from_fixture("linkedin_posts", SourceKind::LinkedIn, "{ not json")),
        Box::new(ScrapeCollector::from_fixture("twitter_hashtag", SourceKind::XPost, &x)),
    ];
    let got = collect_all(&collectors).await.unwrap();
    assert_eq!(got.failures, 1);
    assert_eq!(got.items.len(), 1);
}

#[tokio::test]
async fn every_source_broken_aborts() {
    let collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(ScrapeCollector::from_fixture("a", SourceKind::LinkedIn, "{ not json")),
        Box::new(ScrapeCollector::from_fixture("b", SourceKind::XPost, "[")),
    ];
    let err = collect_all(&collectors).await.unwrap_err();
    assert!(matches!(err, PipelineError::AllCollectorsFailed(2)));
}
