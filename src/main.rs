use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pacer::clock;
use pacer::config::PacerConfig;
use pacer::ratelimit::{LeakyBucket, WindowedLimiter};

/// Feed a sequence of integers through one of the pacer limiters.
#[derive(Debug, Parser)]
#[command(name = "pacer", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Number of integers to send through the limiter
    #[arg(short = 'n', long, default_value_t = 12)]
    count: u64,

    /// Which limiter to drive
    #[arg(short, long, value_enum, default_value_t = LimiterKind::Window)]
    limiter: LimiterKind,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LimiterKind {
    Bucket,
    Window,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => PacerConfig::from_file(path)?,
        None => PacerConfig::default(),
    };
    info!(?config, "Configuration loaded");

    match args.limiter {
        LimiterKind::Bucket => run_bucket(&config, args.count).await?,
        LimiterKind::Window => run_window(&config, args.count).await?,
    }

    Ok(())
}

/// Try to take a token for each integer, pausing half an interval between
/// attempts so replenishment can catch up.
async fn run_bucket(config: &PacerConfig, count: u64) -> anyhow::Result<()> {
    let bucket = LeakyBucket::from_config(&config.bucket)?;
    let interval = config.bucket.replenish_interval();
    bucket.start_replenishment(interval)?;

    let start = clock::now();
    for n in 1..=count {
        let granted = bucket.try_acquire();
        info!(
            n,
            granted,
            available = bucket.available(),
            elapsed = ?start.elapsed(),
            "Bucket decision"
        );
        clock::after(interval / 2).await;
    }

    bucket.stop_replenishment();
    Ok(())
}

/// Square each integer through the window limiter from concurrent tasks.
async fn run_window(config: &PacerConfig, count: u64) -> anyhow::Result<()> {
    let limiter = Arc::new(WindowedLimiter::from_config(&config.window)?);
    let start = clock::now();

    let calls = (1..=count).map(|n| {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            let result = limiter
                .invoke_infallible(n, |n| async move { n * n })
                .await;
            info!(n, result, elapsed = ?start.elapsed(), "Window result");
        })
    });

    for call in futures::future::join_all(calls).await {
        call?;
    }

    Ok(())
}
