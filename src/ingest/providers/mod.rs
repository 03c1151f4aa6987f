// src/ingest/providers/mod.rs
pub mod rss;
pub mod scrape;

use chrono::{DateTime, Duration, Utc};

use crate::config::CollectorConfig;
use crate::ingest::types::Collector;

/// Collectors only keep items published inside this window (unknown dates pass).
pub const DEFAULT_MAX_AGE_HOURS: i64 = 24;

pub(crate) fn within_window(
    published: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_age: Duration,
) -> bool {
    match published {
        Some(ts) => now.signed_duration_since(ts) <= max_age,
        None => true,
    }
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("mention-digest/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(std::time::Duration::from_secs(5))
        .timeout(std::time::Duration::from_secs(20))
        .build()
        .unwrap_or_default()
}

/// Build collectors from resolved config, in config order.
pub fn build_collectors(cfgs: &[CollectorConfig]) -> Vec<Box<dyn Collector>> {
    cfgs.iter()
        .map(|cfg| -> Box<dyn Collector> {
            match cfg {
                CollectorConfig::Rss {
                    name,
                    url,
                    max_age_hours,
                } => {
                    let c = rss::RssCollector::from_url(name.clone(), url.clone());
                    Box::new(match max_age_hours {
                        Some(h) => c.with_max_age_hours(*h),
                        None => c,
                    })
                }
                CollectorConfig::Scrape {
                    name,
                    source_kind,
                    url,
                    api_key,
                    max_age_hours,
                } => {
                    let c = scrape::ScrapeCollector::from_url(
                        name.clone(),
                        *source_kind,
                        url.clone(),
                        api_key.clone(),
                    );
                    Box::new(match max_age_hours {
                        Some(h) => c.with_max_age_hours(*h),
                        None => c,
                    })
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::SourceKind;

    #[test]
    fn window_lets_unknown_dates_through() {
        let now = Utc::now();
        let max = Duration::hours(DEFAULT_MAX_AGE_HOURS);
        assert!(within_window(None, now, max));
        assert!(within_window(Some(now - Duration::hours(2)), now, max));
        assert!(!within_window(Some(now - Duration::hours(30)), now, max));
    }

    #[test]
    fn collectors_follow_config_order() {
        let cfgs = vec![
            CollectorConfig::Scrape {
                name: "linkedin_search".into(),
                source_kind: SourceKind::LinkedIn,
                url: "https://scrape.test/result.json".into(),
                api_key: None,
                max_age_hours: Some(48),
            },
            CollectorConfig::Rss {
                name: "Google Alerts".into(),
                url: "https://alerts.test/feed".into(),
                max_age_hours: None,
            },
        ];
        let built = build_collectors(&cfgs);
        assert_eq!(built[0].kind(), SourceKind::LinkedIn);
        assert_eq!(built[1].name(), "Google Alerts");
        assert_eq!(built[1].kind(), SourceKind::Article);
    }
}
