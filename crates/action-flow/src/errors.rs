//! Flow execution error types

use thiserror::Error;

/// Flow execution errors
///
/// Step-level failures are not errors: they become transitions. Only a
/// broken definition or a lost session escapes a run.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Workflow definition is unusable
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// Definition could not be parsed
    #[error("Failed to parse workflow: {0}")]
    Parse(String),

    /// The browser session cannot be driven anymore
    #[error("Session lost during step {step}: {reason}")]
    SessionLost { step: String, reason: String },

    /// Variable substitution produced an invalid action
    #[error("Variable substitution failed: {0}")]
    Substitution(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_yaml::Error> for FlowError {
    fn from(err: serde_yaml::Error) -> Self {
        FlowError::Parse(err.to_string())
    }
}
