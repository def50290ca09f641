use action_flow::FlowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("invalid form plan: {0}")]
    InvalidPlan(String),
    #[error("failed to parse form plan: {0}")]
    Parse(String),
    #[error("session lost on item {item_index}: {reason}")]
    SessionLost { item_index: usize, reason: String },
    #[error("No handoff state found; nothing to resume")]
    NothingToResume,
    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl From<serde_yaml::Error> for BatchError {
    fn from(err: serde_yaml::Error) -> Self {
        BatchError::Parse(err.to_string())
    }
}
