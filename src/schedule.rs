// src/schedule.rs
use std::future::Future;

use chrono::{DateTime, Duration, LocalResult, NaiveTime, TimeZone};
use metrics::counter;
use tokio::task::JoinHandle;

/// Next occurrence of wall-clock `at` strictly after `now`, in `now`'s zone.
/// A time skipped by a DST jump moves forward an hour; an ambiguous one takes the earlier instant.
pub fn next_run_at<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    loop {
        let naive = day.and_time(at);
        let candidate = match tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => Some(t),
            LocalResult::Ambiguous(a, _) => Some(a),
            LocalResult::None => tz
                .from_local_datetime(&(naive + Duration::hours(1)))
                .earliest(),
        };
        if let Some(t) = candidate.filter(|t| t > now) {
            return t;
        }
        day = match day.succ_opt() {
            Some(d) => d,
            None => return now.clone() + Duration::days(1),
        };
    }
}

/// Spawn a task that runs `job` once a day at local time `at`.
pub fn spawn_daily<F, Fut>(at: NaiveTime, job: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let now = chrono::Local::now();
            let next = next_run_at(&now, at);
            let wait = (next.clone() - now).to_std().unwrap_or_default();
            tracing::info!(target: "pipeline", next = %next.to_rfc3339(), "next scheduled run");
            tokio::time::sleep(wait).await;

            counter!("digest_scheduled_runs_total").increment(1);
            job().await;
        }
    })
}
