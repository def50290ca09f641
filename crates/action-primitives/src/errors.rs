//! Error types for action primitives

use formrunner_core_types::SessionError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for action primitive operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// Selector or text target could not be located
    #[error("Target not found: {0}")]
    TargetNotFound(String),

    /// Element exists but cannot receive input (hidden, disabled, obscured)
    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    /// A required wait ran out of attempts
    #[error("Wait timeout: {0}")]
    WaitTimeout(String),

    /// Page-side script failed
    #[error("Script error: {0}")]
    Script(String),

    /// Action parameters were rejected before touching the browser
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Transport or protocol hiccup
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The browser session is gone and cannot be driven anymore
    #[error("Session lost: {0}")]
    SessionLost(String),

    /// Local filesystem failure (screenshots)
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionErrorKind {
    TargetNotFound,
    NotInteractable,
    WaitTimeout,
    Script,
    InvalidParams,
    Protocol,
    SessionLost,
    Io,
    Internal,
}

impl ActionError {
    pub fn kind(&self) -> ActionErrorKind {
        match self {
            ActionError::TargetNotFound(_) => ActionErrorKind::TargetNotFound,
            ActionError::NotInteractable(_) => ActionErrorKind::NotInteractable,
            ActionError::WaitTimeout(_) => ActionErrorKind::WaitTimeout,
            ActionError::Script(_) => ActionErrorKind::Script,
            ActionError::InvalidParams(_) => ActionErrorKind::InvalidParams,
            ActionError::Protocol(_) => ActionErrorKind::Protocol,
            ActionError::SessionLost(_) => ActionErrorKind::SessionLost,
            ActionError::Io(_) => ActionErrorKind::Io,
            ActionError::Internal(_) => ActionErrorKind::Internal,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::TargetNotFound(_)
                | ActionError::NotInteractable(_)
                | ActionError::WaitTimeout(_)
                | ActionError::Script(_)
                | ActionError::Protocol(_)
        )
    }

    /// The session is unusable; nothing local can recover from this.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ActionError::SessionLost(_))
    }

    /// Get error severity level (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            ActionError::SessionLost(_) | ActionError::Internal(_) => 3,
            ActionError::Protocol(_) | ActionError::Io(_) => 2,
            ActionError::TargetNotFound(_) | ActionError::WaitTimeout(_) | ActionError::Script(_) => 1,
            _ => 0,
        }
    }
}

impl From<SessionError> for ActionError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(msg) => ActionError::TargetNotFound(msg),
            SessionError::NotInteractable(msg) => ActionError::NotInteractable(msg),
            SessionError::Script(msg) => ActionError::Script(msg),
            SessionError::Disconnected(msg) => ActionError::SessionLost(msg),
            SessionError::Protocol(msg) => ActionError::Protocol(msg),
        }
    }
}
