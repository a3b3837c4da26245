use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use probewatch::config::{load_config, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "probewatch",
    version,
    about = "Active-probe health monitor and watchdog remediation agent"
)]
struct Cli {
    /// Path to config.json. Falls back to $CONFIG_PATH or ./config/config.json
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_logging(cfg: &Config) {
    let env_filter = if let Ok(level) = std::env::var("LOG_LEVEL") {
        EnvFilter::new(level)
    } else if let Some(level) = &cfg.log_level {
        EnvFilter::new(level)
    } else {
        EnvFilter::new("info")
    };
    let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter).finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to set global subscriber");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(|| std::env::var_os("CONFIG_PATH").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./config/config.json"));

    let cfg = load_config(&config_path)?;
    init_logging(&cfg);
    info!(?config_path, jobs = cfg.jobs.len(), "loaded configuration");

    let listen_addr = cfg.listen_addr.clone();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received ctrl-c; shutting down");
        let _ = shutdown_tx.send(true);
    });

    probewatch::run(cfg, listen_addr, shutdown_rx).await
}
