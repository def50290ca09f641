//! JSON file backed store

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::api::CheckpointStore;
use crate::errors::StoreError;
use crate::fs::{reader, writer};
use crate::model::HandoffState;

pub const DEFAULT_FILE_NAME: &str = "handoff_state.json";

pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn try_save(&self, state: &HandoffState) -> Result<(), StoreError> {
        let data =
            serde_json::to_vec_pretty(state).map_err(|err| StoreError::Encode(err.to_string()))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            writer::write_atomic(&path, &data).map_err(|err| StoreError::io(&path, err))
        })
        .await
        .map_err(|err| StoreError::Internal(err.to_string()))?
    }

    pub async fn try_load(&self) -> Result<Option<HandoffState>, StoreError> {
        let path = self.path.clone();
        let raw = tokio::task::spawn_blocking(move || {
            reader::read_record(&path).map_err(|err| StoreError::io(&path, err))
        })
        .await
        .map_err(|err| StoreError::Internal(err.to_string()))??;

        let Some(raw) = raw else {
            return Ok(None);
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|err| StoreError::Corrupt {
                path: self.path.clone(),
                message: err.to_string(),
            })
    }

    pub async fn try_clear(&self) -> Result<(), StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            writer::remove_file(&path).map_err(|err| StoreError::io(&path, err))
        })
        .await
        .map_err(|err| StoreError::Internal(err.to_string()))?
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, state: &HandoffState) {
        match self.try_save(state).await {
            Ok(()) => debug!(
                path = %self.path.display(),
                reason = %state.reason,
                stage = %state.checkpoint.stage,
                "Checkpoint saved"
            ),
            Err(err) => warn!(error = %err, "Failed to save checkpoint; continuing without it"),
        }
    }

    async fn load(&self) -> Option<HandoffState> {
        match self.try_load().await {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "Ignoring unreadable checkpoint");
                None
            }
        }
    }

    async fn clear(&self) {
        match self.try_clear().await {
            Ok(()) => info!(path = %self.path.display(), "Checkpoint cleared"),
            Err(err) => warn!(error = %err, "Failed to clear checkpoint"),
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
