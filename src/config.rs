//! Application configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! YAML file, then `FORMRUNNER__SECTION__KEY` environment variables.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use action_flow::SequencerOptions;
use action_primitives::{Action, ExecutorOptions};
use batch_runner::{BatchOptions, FillerOptions};
use cdp_adapter::CdpConfig;
use checkpoint_store::file::DEFAULT_FILE_NAME;
use formrunner_core_types::{BlockerRules, Target};
use human_handoff::HandoffConfig;
use serde::{Deserialize, Serialize};

use crate::errors::FormRunnerError;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "FORMRUNNER";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub browser: BrowserSection,
    pub checkpoint: CheckpointSection,
    pub handoff: HandoffSection,
    pub batch: BatchSection,
    pub flow: FlowSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    /// DevTools endpoint of an already running browser
    pub cdp_url: Option<String>,
    pub executable: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
    pub headless: bool,
    pub default_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for BrowserSection {
    fn default() -> Self {
        let executor = ExecutorOptions::default();
        Self {
            cdp_url: None,
            executable: None,
            user_data_dir: None,
            headless: false,
            default_timeout_ms: executor.default_timeout_ms,
            poll_interval_ms: executor.poll_interval_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    pub path: PathBuf,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_FILE_NAME),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffSection {
    pub enabled: bool,
    /// Block on the operator; `false` records the pause and moves on
    pub wait: bool,
    pub screenshot_dir: PathBuf,
    pub blockers: BlockerRules,
}

impl Default for HandoffSection {
    fn default() -> Self {
        let defaults = HandoffConfig::default();
        Self {
            enabled: defaults.enabled,
            wait: defaults.wait,
            screenshot_dir: defaults.screenshot_dir,
            blockers: defaults.rules,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    /// Items per run; all of them when unset
    pub size: Option<usize>,
    /// Clicked after each item, e.g. `text=Next` or `.o_pager_next`
    pub next_unit_target: Option<String>,
    pub next_unit_settle_ms: u64,
    pub item_retries: u32,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            size: None,
            next_unit_target: None,
            next_unit_settle_ms: 1_000,
            item_retries: FillerOptions::default().item_retries,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSection {
    pub max_transition_hops: u32,
    pub persist_every_sub_step: bool,
    pub check_blockers: bool,
}

impl Default for FlowSection {
    fn default() -> Self {
        let sequencer = SequencerOptions::default();
        Self {
            max_transition_hops: sequencer.max_transition_hops,
            persist_every_sub_step: true,
            check_blockers: sequencer.check_blockers,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub json: bool,
    /// Daily rolling log files are written here when set
    pub directory: Option<PathBuf>,
}

impl AppConfig {
    /// Defaults, overlaid with `file` when it exists, then with the
    /// process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, FormRunnerError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(false),
            );
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            default_timeout_ms: self.browser.default_timeout_ms,
            poll_interval_ms: self.browser.poll_interval_ms,
            screenshot_dir: self.handoff.screenshot_dir.clone(),
        }
    }

    pub fn handoff_config(&self) -> HandoffConfig {
        HandoffConfig {
            enabled: self.handoff.enabled,
            wait: self.handoff.wait,
            screenshot_dir: self.handoff.screenshot_dir.clone(),
            rules: self.handoff.blockers.clone(),
        }
    }

    pub fn cdp_config(&self) -> CdpConfig {
        CdpConfig {
            websocket_url: self.browser.cdp_url.clone(),
            executable: self.browser.executable.clone(),
            user_data_dir: self.browser.user_data_dir.clone(),
            headless: self.browser.headless,
            ..CdpConfig::default()
        }
    }

    pub fn batch_options(&self, variables: BTreeMap<String, String>) -> BatchOptions {
        let next_unit = self
            .batch
            .next_unit_target
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| {
                let mut click = Action::click(Target::parse(raw));
                if let Action::Click(params) = &mut click {
                    params.settle_ms = self.batch.next_unit_settle_ms;
                }
                vec![click]
            })
            .unwrap_or_default();

        BatchOptions {
            limit: self.batch.size,
            next_unit,
            filler: FillerOptions {
                item_retries: self.batch.item_retries,
            },
            sequencer: SequencerOptions {
                max_transition_hops: self.flow.max_transition_hops,
                check_blockers: self.flow.check_blockers,
            },
            persist_every_sub_step: self.flow.persist_every_sub_step,
            variables,
        }
    }
}
