//! mention-digest: collect mentions, build the daily digest, deliver it.
//!
//! ```bash
//! mention-digest run                 # one run, prints the run summary as JSON
//! mention-digest run --dry-run       # deliver to the log only, seen ids untouched
//! mention-digest schedule            # run daily at [schedule].at (local time)
//! mention-digest check-config        # resolve + validate, no network
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mention_digest::config::{self, DigestConfig, ENV_CONFIG_PATH};
use mention_digest::error::{PipelineError, PipelineResult};
use mention_digest::metrics::install_exporter;
use mention_digest::notify::LogSender;
use mention_digest::pipeline::{Pipeline, RunSummary};
use mention_digest::schedule::spawn_daily;
use mention_digest::seen::{JsonFileSeenStore, MemorySeenStore, RunLock, SeenStore};

const DEFAULT_LOG_FILTER: &str = "warn,mention_digest=info,pipeline=info,enrich=info,notify=info";

#[derive(Parser, Debug)]
#[command(name = "mention-digest")]
#[command(about = "Daily mention digest: collect, dedupe, filter, summarize, deliver")]
#[command(version)]
struct Cli {
    /// Config file (TOML or JSON). Defaults to config/digest.toml, then config/digest.json
    #[arg(long, short, env = ENV_CONFIG_PATH, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON log lines on the console
    #[arg(long, global = true)]
    json_logs: bool,

    /// Directory for the daily-rolling log file
    #[arg(long, default_value = "logs", global = true)]
    log_dir: PathBuf,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9100)
    #[arg(long, global = true)]
    metrics_addr: Option<SocketAddr>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline once
    Run {
        /// Replace configured channels with a log-only channel; seen ids are not saved
        #[arg(long)]
        dry_run: bool,
    },
    /// Run daily at the configured local time until interrupted
    Schedule {
        #[arg(long)]
        dry_run: bool,
        /// Also run once immediately on startup
        #[arg(long)]
        run_now: bool,
    },
    /// Load, resolve and validate the config, then exit
    CheckConfig,
}

fn init_tracing(json: bool, log_dir: &Path) -> WorkerGuard {
    let _ = std::fs::create_dir_all(log_dir);
    let file_appender = tracing_appender::rolling::daily(log_dir, "mention-digest.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer().compact()))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    guard
}

fn load_config(path: Option<&Path>) -> PipelineResult<DigestConfig> {
    let loaded = match path {
        Some(p) => config::load_from(p),
        None => config::load_default(),
    };
    loaded.map_err(|e| PipelineError::config(format!("{e:#}")))
}

async fn run_once(cfg: &DigestConfig, dry_run: bool) -> PipelineResult<RunSummary> {
    let _lock = RunLock::acquire(&cfg.state.lock_path)?;
    let mut pipeline = Pipeline::from_config(cfg)?;
    let file_store = JsonFileSeenStore::new(&cfg.state.seen_path);
    tracing::debug!(
        seen = %file_store.path().display(),
        lock = %cfg.state.lock_path.display(),
        dry_run,
        "run starting"
    );

    if dry_run {
        pipeline = pipeline.with_channels(vec![Arc::new(LogSender::new("dry-run"))])?;
        let ids = file_store.load().map_err(PipelineError::SeenStore)?;
        return pipeline.run(&MemorySeenStore::with_ids(ids)).await;
    }
    pipeline.run(&file_store).await
}

fn print_summary(summary: &RunSummary) {
    match serde_json::to_string_pretty(summary) {
        Ok(s) => println!("{s}"),
        Err(e) => tracing::warn!(error = %e, "failed to serialize run summary"),
    }
}

fn report(result: PipelineResult<RunSummary>, failure: &str) {
    match result {
        Ok(s) => print_summary(&s),
        Err(e) => {
            if let Some(s) = e.run_summary() {
                print_summary(s);
            }
            tracing::error!(error = %e, "{failure}");
        }
    }
}

async fn real_main(cli: Cli) -> PipelineResult<()> {
    let cfg = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::CheckConfig => {
            let resolved = cfg.resolved()?;
            tracing::info!(
                keywords = resolved.digest.keywords.len(),
                channels = resolved.channels.len(),
                collectors = resolved.collectors.len(),
                "config ok"
            );
            println!("config ok");
            Ok(())
        }
        Command::Run { dry_run } => match run_once(&cfg, dry_run).await {
            Ok(summary) => {
                print_summary(&summary);
                Ok(())
            }
            Err(e) => {
                // delivery may have happened even though the run failed afterwards
                if let Some(summary) = e.run_summary() {
                    print_summary(summary);
                }
                Err(e)
            }
        },
        Command::Schedule { dry_run, run_now } => {
            // fail fast before the first sleep
            let at = cfg.resolved()?.schedule.time_of_day()?;
            let cfg = Arc::new(cfg);

            if run_now {
                report(run_once(&cfg, dry_run).await, "run failed");
            }

            let job_cfg = cfg.clone();
            let handle = spawn_daily(at, move || {
                let cfg = job_cfg.clone();
                async move {
                    report(run_once(&cfg, dry_run).await, "scheduled run failed");
                }
            });

            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutdown requested");
            handle.abort();
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional; real environment wins.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.json_logs, &cli.log_dir);

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = install_exporter(addr) {
            tracing::warn!(error = %e, "metrics disabled");
        }
    }

    match real_main(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "aborted");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
