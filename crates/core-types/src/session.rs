use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::{PageLocation, Probe, SessionId, Target};

/// Failures reported by a browser session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("element not found: {0}")]
    NotFound(String),

    #[error("element not interactable: {0}")]
    NotInteractable(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    /// The session can no longer be driven.
    #[error("session disconnected: {0}")]
    Disconnected(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Primitive surface of one remote-controlled browser tab.
///
/// The engine never constructs a session; one is handed to it. Callers must
/// not drive the same session from two flows at once.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    fn id(&self) -> &SessionId;

    async fn navigate(&self, url: &str) -> Result<(), SessionError>;

    async fn click(&self, target: &Target) -> Result<(), SessionError>;

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), SessionError>;

    async fn clear(&self, selector: &str) -> Result<(), SessionError>;

    async fn evaluate(&self, probe: &Probe) -> Result<Value, SessionError>;

    async fn screenshot(&self) -> Result<Vec<u8>, SessionError>;

    async fn current_location(&self) -> Result<PageLocation, SessionError>;
}
