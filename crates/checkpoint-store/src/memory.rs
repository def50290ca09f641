//! In-process store, encoded as JSON so it behaves like the file store

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;

use crate::api::CheckpointStore;
use crate::model::HandoffState;

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    record: Mutex<Option<String>>,
    saves: AtomicUsize,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn raw(&self) -> Option<String> {
        self.record.lock().clone()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, state: &HandoffState) {
        match serde_json::to_string(state) {
            Ok(encoded) => {
                *self.record.lock() = Some(encoded);
                self.saves.fetch_add(1, Ordering::SeqCst);
            }
            Err(err) => warn!(error = %err, "Failed to encode checkpoint"),
        }
    }

    async fn load(&self) -> Option<HandoffState> {
        let raw = self.record.lock().clone()?;
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!(error = %err, "Ignoring unreadable checkpoint");
                None
            }
        }
    }

    async fn clear(&self) {
        self.record.lock().take();
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Checkpoint, Progress};
    use serde_json::json;

    #[tokio::test]
    async fn last_writer_wins() {
        let store = InMemoryCheckpointStore::new();
        let mut progress = Progress::new(Checkpoint::for_item(0), json!({}));
        store.save_progress(&progress, "first", None).await;
        progress.checkpoint.set_field("date");
        store.save_progress(&progress, "second", None).await;

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.reason, "second");
        assert_eq!(loaded.checkpoint.field.as_deref(), Some("date"));
        assert_eq!(store.save_count(), 2);

        store.clear().await;
        assert!(store.load().await.is_none());
    }
}
