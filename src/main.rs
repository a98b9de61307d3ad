use anyhow::Context;
use clap::Parser;
use ensemble_collector::config::environment::load_dotenv;
use ensemble_collector::logging::{
    init_logging, level_from_env, spawn_log_maintenance, DEFAULT_LOG_RETENTION,
};
use ensemble_collector::scheduler_from_file;
use log::{debug, info};
use std::path::PathBuf;
use std::time::Duration;

/// Collects ensemble weather forecasts on a fixed schedule.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Write logs to this file as well, rotated daily.
    #[arg(short, long)]
    log_file: Option<PathBuf>,

    /// Number of compressed log files to keep.
    #[arg(long, default_value_t = DEFAULT_LOG_RETENTION)]
    log_retention: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let found_dotenv = load_dotenv();

    let level = level_from_env(std::env::var("RUST_LOG").ok().as_deref());
    init_logging(args.log_file.as_deref(), level).context("Failed to set up logging")?;
    if found_dotenv {
        debug!("Loaded environment from .env");
    }
    let maintenance = args
        .log_file
        .clone()
        .map(|path| spawn_log_maintenance(path, args.log_retention));

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(120))
        .build()
        .context("Failed to build HTTP client")?;

    let scheduler = scheduler_from_file(&args.config, client)
        .await
        .with_context(|| format!("Failed to start from {}", args.config.display()))?;
    let handle = scheduler.start();
    info!("Collector running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    handle.shutdown().await;
    if let Some(task) = maintenance {
        task.abort();
    }
    Ok(())
}
