use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("checkpoint io failed at {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("checkpoint encode failed: {0}")]
    Encode(String),

    #[error("checkpoint record corrupt at {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
