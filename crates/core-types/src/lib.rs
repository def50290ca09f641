//! Shared primitives for the FormRunner engine.
//!
//! Everything that more than one layer needs to agree on lives here: ids,
//! the observable page location, action targets, probes and the browser
//! session contract consumed by the executor.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod probe;
mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use probe::{Blocker, BlockerKind, BlockerRules, Probe, Target, BLOCKER_DETAIL_LIMIT};
pub use session::{BrowserSession, SessionError};

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ActionId(pub String);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the browser currently is.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PageLocation {
    pub url: String,
    #[serde(default)]
    pub title: String,
}

impl PageLocation {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}
