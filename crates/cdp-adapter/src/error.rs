use std::fmt;

use chromiumoxide::error::CdpError;
use formrunner_core_types::SessionError;
use thiserror::Error;

/// High-level error categories surfaced by the adapter.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AdapterErrorKind {
    #[error("browser launch failed")]
    Launch,
    #[error("cdp i/o failure")]
    CdpIo,
    #[error("deadline exceeded")]
    Timeout,
    #[error("target element not found")]
    TargetNotFound,
    #[error("script failed")]
    Script,
    #[error("browser disconnected")]
    Disconnected,
    #[error("internal error")]
    Internal,
}

#[derive(Clone, Debug)]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub hint: Option<String>,
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, ": {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for AdapterError {}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind) -> Self {
        Self { kind, hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<CdpError> for AdapterError {
    fn from(err: CdpError) -> Self {
        let hint = err.to_string();
        let kind = match err {
            CdpError::Timeout => AdapterErrorKind::Timeout,
            CdpError::NotFound | CdpError::FrameNotFound(_) => AdapterErrorKind::TargetNotFound,
            CdpError::JavascriptException(_) => AdapterErrorKind::Script,
            CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
                AdapterErrorKind::Disconnected
            }
            CdpError::LaunchExit(_, _) | CdpError::LaunchTimeout(_) | CdpError::LaunchIo(_, _) => {
                AdapterErrorKind::Launch
            }
            _ => AdapterErrorKind::CdpIo,
        };
        AdapterError::new(kind).with_hint(hint)
    }
}

impl From<AdapterError> for SessionError {
    fn from(err: AdapterError) -> Self {
        let message = err.to_string();
        match err.kind {
            AdapterErrorKind::TargetNotFound => SessionError::NotFound(message),
            AdapterErrorKind::Script => SessionError::Script(message),
            AdapterErrorKind::Disconnected | AdapterErrorKind::Launch => {
                SessionError::Disconnected(message)
            }
            AdapterErrorKind::CdpIo | AdapterErrorKind::Timeout | AdapterErrorKind::Internal => {
                SessionError::Protocol(message)
            }
        }
    }
}
