//! Friend Safety Monitor - Main Entry Point

use api::{init_logging, run_server, AppConfig};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "safety-monitor", version, about = "Friend-safety alerting and escalation server")]
struct Cli {
    /// Configuration file (defaults to ./safety-monitor.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind_addr = bind;
    }

    init_logging(&config.logging)?;

    info!("=== Friend Safety Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Default thresholds: max HR {} bpm, min HR {} bpm, max distance {}m, grace {}s",
        config.defaults.max_heart_rate,
        config.defaults.min_heart_rate,
        config.defaults.max_distance_apart,
        config.defaults.grace_period_secs
    );

    run_server(config).await
}
