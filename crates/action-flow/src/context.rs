//! Per-run session context
//!
//! Everything a run mutates lives here and is passed explicitly: the
//! executor owning the tab, the handoff controller, and the progress
//! record. There is no ambient state.

use std::collections::BTreeMap;
use std::sync::Arc;

use action_primitives::ActionExecutor;
use checkpoint_store::{CheckpointStore, Progress};
use human_handoff::HandoffController;

use crate::variables::item_variables;

/// Reason recorded by routine sub-step saves.
pub const PROGRESS_REASON: &str = "progress";

pub struct SessionContext {
    pub executor: Arc<dyn ActionExecutor>,
    pub handoff: Arc<HandoffController>,
    pub progress: Progress,
    pub variables: BTreeMap<String, String>,
    /// Write the checkpoint after every completed sub-step
    pub persist_every_sub_step: bool,
}

impl SessionContext {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        handoff: Arc<HandoffController>,
        progress: Progress,
    ) -> Self {
        let variables = item_variables(&progress.item_data);
        Self {
            executor,
            handoff,
            progress,
            variables,
            persist_every_sub_step: false,
        }
    }

    pub fn with_variables(mut self, vars: &BTreeMap<String, String>) -> Self {
        for (key, value) in vars {
            self.variables
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        self.handoff.store()
    }

    /// Saves the current progress; never fails.
    pub async fn persist(&self, reason: &str) {
        self.store()
            .save_progress(&self.progress, reason, None)
            .await;
    }

    pub async fn persist_sub_step(&self) {
        if self.persist_every_sub_step {
            self.persist(PROGRESS_REASON).await;
        }
    }
}
