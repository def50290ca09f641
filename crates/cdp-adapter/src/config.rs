use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How to reach the browser.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CdpConfig {
    /// DevTools endpoint of a running browser (`http://127.0.0.1:9222` or a
    /// `ws://` url). A local browser is launched when absent.
    pub websocket_url: Option<String>,
    pub executable: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
    pub headless: bool,
    /// Upper bound for any single protocol round trip
    pub default_deadline_ms: u64,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            websocket_url: None,
            executable: None,
            user_data_dir: None,
            headless: true,
            default_deadline_ms: 30_000,
        }
    }
}

impl CdpConfig {
    pub fn connect_to(url: impl Into<String>) -> Self {
        Self {
            websocket_url: Some(url.into()),
            ..Self::default()
        }
    }
}
