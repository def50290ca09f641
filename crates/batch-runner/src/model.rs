use checkpoint_store::{ResultStatus, WorkflowResult};
use serde::Serialize;

/// What happened to one work item in this run.
#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub index: usize,
    pub status: ResultStatus,
    /// Set when the item ended without a usable result, e.g. the session died
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub result: WorkflowResult,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Indices already completed by an earlier run
    pub skipped: Vec<usize>,
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchResult {
    pub(crate) fn with_total(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub(crate) fn push(&mut self, outcome: ItemOutcome) {
        if outcome.is_success() {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    pub fn outcome(&self, index: usize) -> Option<&ItemOutcome> {
        self.outcomes.iter().find(|outcome| outcome.index == index)
    }
}
