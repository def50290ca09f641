//! Error types of the command-line layer

use std::path::PathBuf;

use action_flow::FlowError;
use batch_runner::BatchError;
use cdp_adapter::AdapterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormRunnerError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Work item input has an unusable shape
    #[error("Invalid items: {0}")]
    Items(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("Browser error: {0}")]
    Browser(#[from] AdapterError),
}

impl FormRunnerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FormRunnerError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, FormRunnerError>;
