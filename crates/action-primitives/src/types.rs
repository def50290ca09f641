//! Core data types for action primitives

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use formrunner_core_types::{PageLocation, Probe, Target};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One primitive browser action with its typed parameters.
///
/// Serialized with an inline `kind` tag so workflow files read as
/// `{ kind: click, target: { text: "New" } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Navigate(NavigateParams),
    Click(ClickParams),
    Type(TypeParams),
    Wait(WaitParams),
    Probe(ProbeParams),
    Screenshot(ScreenshotParams),
}

impl Action {
    pub fn navigate(url: impl Into<String>) -> Self {
        Action::Navigate(NavigateParams { url: url.into() })
    }

    pub fn click(target: Target) -> Self {
        Action::Click(ClickParams {
            target,
            settle_ms: 0,
        })
    }

    pub fn type_text(selector: impl Into<String>, text: impl Into<String>) -> Self {
        Action::Type(TypeParams {
            selector: selector.into(),
            text: text.into(),
            clear: true,
        })
    }

    pub fn wait(condition: WaitCondition) -> Self {
        Action::Wait(WaitParams {
            condition,
            timeout_ms: None,
            poll_interval_ms: None,
            required: false,
        })
    }

    pub fn probe(probe: Probe) -> Self {
        Action::Probe(ProbeParams { probe })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Action::Navigate(_) => "navigate",
            Action::Click(_) => "click",
            Action::Type(_) => "type",
            Action::Wait(_) => "wait",
            Action::Probe(_) => "probe",
            Action::Screenshot(_) => "screenshot",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Navigate(p) => write!(f, "navigate {}", p.url),
            Action::Click(p) => write!(f, "click {}", p.target),
            Action::Type(p) => write!(f, "type into {}", p.selector),
            Action::Wait(p) => write!(f, "wait for {:?}", p.condition),
            Action::Probe(p) => write!(f, "probe {:?}", p.probe),
            Action::Screenshot(_) => f.write_str("screenshot"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigateParams {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickParams {
    pub target: Target,
    /// Pause after the click for the page to react
    #[serde(default)]
    pub settle_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeParams {
    pub selector: String,
    pub text: String,
    /// Clear the input first; typing is not idempotent.
    #[serde(default = "default_true")]
    pub clear: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitParams {
    pub condition: WaitCondition,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    /// A timed-out required wait yields a report with `ok == false`.
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WaitCondition {
    ElementVisible(String),
    /// Modal closed, spinner gone
    ElementHidden(String),
    TextVisible(String),
    UrlContains(String),
    PageIdle,
    /// Plain sleep, always found
    Delay(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeParams {
    pub probe: Probe,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotParams {
    /// Target file; a timestamped name in the executor's directory otherwise
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

/// What an action produced besides side effects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionOutput {
    #[default]
    None,
    Wait {
        found: bool,
        attempts: u32,
    },
    Probe {
        value: Value,
    },
    Screenshot {
        path: PathBuf,
        bytes: usize,
    },
}

/// Normalized result of one executed action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    /// Whether the action achieved its purpose
    pub ok: bool,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub finished_at: DateTime<Utc>,

    /// Total latency in milliseconds
    pub latency_ms: u64,

    pub output: ActionOutput,

    /// Page location observed after the action, when cheap to get
    pub location_after: Option<PageLocation>,
}

impl ActionReport {
    pub fn success(started_at: DateTime<Utc>, latency_ms: u64) -> Self {
        Self {
            ok: true,
            started_at,
            finished_at: Utc::now(),
            latency_ms,
            output: ActionOutput::None,
            location_after: None,
        }
    }

    pub fn with_output(mut self, output: ActionOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_location(mut self, location: Option<PageLocation>) -> Self {
        self.location_after = location;
        self
    }

    pub fn with_ok(mut self, ok: bool) -> Self {
        self.ok = ok;
        self
    }

    pub fn probe_value(&self) -> Option<&Value> {
        match &self.output {
            ActionOutput::Probe { value } => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_parses_from_yaml_shape() {
        let action: Action = serde_json::from_value(serde_json::json!({
            "kind": "type",
            "selector": "input[name=partner]",
            "text": "Acme"
        }))
        .unwrap();
        match action {
            Action::Type(params) => {
                assert!(params.clear);
                assert_eq!(params.text, "Acme");
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn wait_condition_is_adjacently_tagged() {
        let action: Action = serde_json::from_value(serde_json::json!({
            "kind": "wait",
            "condition": { "type": "element_hidden", "value": ".o_loading" },
            "timeout_ms": 2000
        }))
        .unwrap();
        assert_eq!(action.kind_name(), "wait");
    }

    #[test]
    fn report_builder_keeps_output() {
        let report = ActionReport::success(Utc::now(), 5).with_output(ActionOutput::Probe {
            value: Value::Bool(true),
        });
        assert_eq!(report.probe_value(), Some(&Value::Bool(true)));
    }
}
