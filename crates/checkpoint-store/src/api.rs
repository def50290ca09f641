use async_trait::async_trait;
use formrunner_core_types::Blocker;

use crate::model::{HandoffState, Progress};

/// Single-record store for the in-flight run.
///
/// `save` never fails from the caller's point of view: persistence errors
/// are logged and the run continues without durable state for that step.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, state: &HandoffState);

    /// `None` when no record exists or the record cannot be decoded.
    async fn load(&self) -> Option<HandoffState>;

    async fn clear(&self);

    /// Human-readable location of the record
    fn location(&self) -> String;

    async fn save_progress(&self, progress: &Progress, reason: &str, blocker: Option<Blocker>) {
        let state = HandoffState::capture(progress, reason).with_blocker(blocker);
        self.save(&state).await;
    }

    async fn exists(&self) -> bool {
        self.load().await.is_some()
    }
}
