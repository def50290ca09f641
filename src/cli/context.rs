use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;

/// What every command receives besides its own arguments.
#[derive(Clone)]
pub struct CliContext {
    config: Arc<AppConfig>,
    config_path: Option<PathBuf>,
}

impl CliContext {
    pub fn new(config: AppConfig, config_path: Option<PathBuf>) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config_path.as_ref()
    }
}
