use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use tokio::signal;
use tracing::info;

use sensorhub::{
    app::Hub,
    config::{HubConfig, load_dotenv},
    logger::{convert_level, init_tracing},
};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "config.json")]
    pub config: PathBuf,

    /// Log level (error, warn, info, debug, trace). RUST_LOG wins when set.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Also write daily rolling log files into this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl RunArgs {
    pub fn default_runtime() -> Self {
        Self {
            config: PathBuf::from("config.json"),
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    let _log_guard = init_tracing(convert_level(&args.log_level), args.log_dir.as_deref())?;
    info!("sensorhub starting up");

    let config_dir = args.config.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    load_dotenv(config_dir);
    let config = HubConfig::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;

    let mut hub = Hub::new();
    hub.bootstrap(config).await.context("starting sensor hub")?;

    println!("sensorhub running; press Ctrl-C to exit");
    signal::ctrl_c().await.context("waiting for Ctrl-C")?;

    println!("\nShutting down...");
    hub.shutdown().await;
    info!(relay = ?hub.relay_state(), "sensorhub stopped");
    Ok(())
}
