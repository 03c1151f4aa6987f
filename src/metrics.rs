use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;

static DESCRIBED: OnceCell<()> = OnceCell::new();

/// Register help text for every metric the pipeline emits. Safe to call repeatedly.
pub fn describe() {
    DESCRIBED.get_or_init(|| {
        describe_counter!("digest_collected_total", "Raw items returned by collectors");
        describe_counter!(
            "digest_collector_errors_total",
            "Collector runs that failed"
        );
        describe_counter!(
            "digest_collector_http_errors_total",
            "Collector fetches that failed at the HTTP layer"
        );
        describe_counter!(
            "digest_malformed_total",
            "Items dropped by the normalizer for having no title and no body"
        );
        describe_counter!(
            "digest_duplicates_total",
            "Records dropped as duplicates within a batch or seen in earlier runs"
        );
        describe_counter!(
            "digest_filtered_total",
            "Records dropped for matching no keyword"
        );
        describe_counter!(
            "digest_enrich_fallback_total",
            "Records whose title/summary came from the local fallback"
        );
        describe_counter!(
            "digest_delivery_total",
            "Channel deliveries by channel and status"
        );
        describe_counter!("digest_scheduled_runs_total", "Runs started by the daily scheduler");
        describe_gauge!(
            "digest_last_run_ts",
            Unit::Seconds,
            "Unix time of the last completed run"
        );
        describe_gauge!("digest_last_run_items", "Items in the last delivered digest");
        describe_histogram!(
            "digest_feed_parse_ms",
            Unit::Milliseconds,
            "Time spent parsing one feed"
        );
    });
}

/// Install the Prometheus recorder and serve `/metrics` on `listen`.
/// Without a call to this, metric macros are no-ops. Must run inside the
/// tokio runtime.
pub fn install_exporter(listen: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .with_context(|| format!("prometheus: listen on {listen}"))?;
    tracing::info!(addr = %listen, "prometheus exporter listening");
    describe();
    gauge!("digest_build_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    Ok(())
}
