use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{AppConfig, LoggingSection};

const LOG_FILE_PREFIX: &str = "formrunner.log";

/// Installs the global subscriber. The returned guard flushes the file sink
/// and must live as long as the process.
pub fn init_logging(
    level: &str,
    debug: bool,
    logging: &LoggingSection,
) -> Result<Option<WorkerGuard>> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    // Console output goes to stderr so stdout carries only command output.
    let (json_layer, text_layer) = if logging.json {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_writer(std::io::stderr)))
    };

    let (file_layer, guard) = match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(guard)
}

pub struct LoadedConfig {
    pub config: AppConfig,
    /// File consulted, whether or not it exists
    pub path: Option<PathBuf>,
    pub found: bool,
}

pub fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let path = match config_path {
        Some(path) => Some(path.clone()),
        None => {
            // Priority: ./config/formrunner.yaml > ~/.config/formrunner/config.yaml
            let local_config = PathBuf::from("config/formrunner.yaml");
            if local_config.exists() {
                Some(local_config)
            } else {
                dirs::config_dir().map(|mut path| {
                    path.push("formrunner");
                    path.push("config.yaml");
                    path
                })
            }
        }
    };

    let found = path.as_ref().map(|path| path.exists()).unwrap_or(false);
    let source = path.as_deref().filter(|_| found);
    let config = AppConfig::load(source).context("Failed to load configuration")?;

    Ok(LoadedConfig {
        config,
        path,
        found,
    })
}
