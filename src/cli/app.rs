use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{init_logging, load_config, LoadedConfig};

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    let LoadedConfig { config, path, found } = load_config(cli.config.as_ref())?;
    let _log_guard = init_logging(&cli.log_level, cli.debug, &config.logging)?;

    info!("Starting FormRunner v{}", env!("CARGO_PKG_VERSION"));
    match (&path, found) {
        (Some(path), true) => info!("Loaded configuration from: {}", path.display()),
        (Some(path), false) => warn!(
            "Config file not found, using defaults: {}",
            path.display()
        ),
        (None, _) => warn!("No configuration directory available, using defaults"),
    }

    let cli_context = CliContext::new(config, path);

    match dispatch(&cli, &cli_context).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {}", err);
            Err(err)
        }
    }
}
