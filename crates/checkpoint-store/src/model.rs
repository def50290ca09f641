use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use formrunner_core_types::Blocker;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HANDOFF_STATE_VERSION: u32 = 1;

/// Coarse phase of a run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Init,
    Navigate,
    Batch,
    FillForm,
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Navigate => "navigate",
            Stage::Batch => "batch",
            Stage::FillForm => "fill_form",
            Stage::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Exactly where a run last made progress.
///
/// Coarser positions supersede finer ones: entering a stage clears the
/// step, field, line and sub-step positions. `item_index` belongs to the
/// batch loop and survives stage changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stage: Stage,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub item_index: Option<usize>,
    #[serde(default)]
    pub line_index: Option<usize>,
    #[serde(default)]
    pub sub_step: Option<String>,
    #[serde(default)]
    pub last_completed_sub_step: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Keys written by other versions, kept verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl Checkpoint {
    pub fn new() -> Self {
        Self {
            stage: Stage::Init,
            step: None,
            field: None,
            item_index: None,
            line_index: None,
            sub_step: None,
            last_completed_sub_step: None,
            timestamp: Utc::now(),
            extra: BTreeMap::new(),
        }
    }

    /// Fresh checkpoint for a batch item at stage `init`.
    pub fn for_item(index: usize) -> Self {
        Self {
            item_index: Some(index),
            ..Self::new()
        }
    }

    pub fn enter_stage(&mut self, stage: Stage) {
        self.stage = stage;
        self.step = None;
        self.clear_field();
        self.touch();
    }

    pub fn set_step(&mut self, step: impl Into<String>) {
        self.step = Some(step.into());
        self.touch();
    }

    /// Starts a workflow step from its first sub-step.
    pub fn enter_step(&mut self, step: impl Into<String>) {
        self.step = Some(step.into());
        self.sub_step = None;
        self.last_completed_sub_step = None;
        self.touch();
    }

    /// Moves to a new field; line and sub-step positions restart.
    pub fn set_field(&mut self, field: impl Into<String>) {
        self.field = Some(field.into());
        self.line_index = None;
        self.sub_step = None;
        self.last_completed_sub_step = None;
        self.touch();
    }

    pub fn set_line(&mut self, line_index: usize) {
        if self.line_index != Some(line_index) {
            self.sub_step = None;
            self.last_completed_sub_step = None;
        }
        self.line_index = Some(line_index);
        self.touch();
    }

    pub fn begin_sub_step(&mut self, name: impl Into<String>) {
        self.sub_step = Some(name.into());
        self.touch();
    }

    pub fn complete_sub_step(&mut self, name: impl Into<String>) {
        self.last_completed_sub_step = Some(name.into());
        self.touch();
    }

    pub fn clear_field(&mut self) {
        self.field = None;
        self.line_index = None;
        self.sub_step = None;
        self.last_completed_sub_step = None;
    }

    /// True when `name` sits at or before the last completed sub-step in
    /// `order`. Unknown names are never skipped.
    pub fn sub_step_done(&self, order: &[&str], name: &str) -> bool {
        let Some(last) = self.last_completed_sub_step.as_deref() else {
            return false;
        };
        match (
            order.iter().position(|s| *s == name),
            order.iter().position(|s| *s == last),
        ) {
            (Some(current), Some(done)) => current <= done,
            _ => false,
        }
    }

    fn touch(&mut self) {
        self.timestamp = Utc::now();
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    #[default]
    Running,
    Success,
    Partial,
    Failed,
    AwaitingHuman,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultStatus::Running => "running",
            ResultStatus::Success => "success",
            ResultStatus::Partial => "partial",
            ResultStatus::Failed => "failed",
            ResultStatus::AwaitingHuman => "awaiting_human",
        };
        f.write_str(name)
    }
}

/// Accumulated, itemized outcome of one workflow run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    #[serde(default)]
    pub status: ResultStatus,
    #[serde(default)]
    pub fields_attempted: Vec<String>,
    #[serde(default)]
    pub fields_filled: BTreeMap<String, Value>,
    #[serde(default)]
    pub fields_failed: BTreeMap<String, String>,
    #[serde(default)]
    pub steps_taken: Vec<String>,
    #[serde(default)]
    pub awaiting_human_decision: Option<Value>,
    #[serde(default)]
    pub execution_time_ms: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl WorkflowResult {
    pub fn record_attempt(&mut self, field: &str) {
        if !self.fields_attempted.iter().any(|f| f == field) {
            self.fields_attempted.push(field.to_string());
        }
    }

    pub fn record_filled(&mut self, field: &str, value: Value) {
        self.fields_failed.remove(field);
        self.fields_filled.insert(field.to_string(), value);
    }

    pub fn record_failed(&mut self, field: &str, reason: impl Into<String>) {
        self.fields_failed.insert(field.to_string(), reason.into());
    }

    pub fn log_step(&mut self, entry: impl Into<String>) {
        self.steps_taken.push(entry.into());
    }

    /// Settles a running result from its field tallies. Explicit
    /// `failed` and `awaiting_human` outcomes are left alone.
    pub fn finalize(&mut self) {
        if matches!(
            self.status,
            ResultStatus::Failed | ResultStatus::AwaitingHuman
        ) {
            return;
        }
        let filled = self
            .fields_attempted
            .iter()
            .filter(|f| self.fields_filled.contains_key(*f))
            .count();
        self.status = if filled == self.fields_attempted.len() {
            ResultStatus::Success
        } else if filled > 0 {
            ResultStatus::Partial
        } else {
            ResultStatus::Failed
        };
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

/// In-flight state of one run: position, outcome so far, and the item
/// being worked on.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Progress {
    pub checkpoint: Checkpoint,
    pub result: WorkflowResult,
    pub item_data: Value,
}

impl Progress {
    pub fn new(checkpoint: Checkpoint, item_data: Value) -> Self {
        Self {
            checkpoint,
            result: WorkflowResult::default(),
            item_data,
        }
    }
}

/// The persisted record; everything needed to rebuild a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HandoffState {
    pub version: u32,
    pub reason: String,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub blocker: Option<Blocker>,
    pub checkpoint: Checkpoint,
    #[serde(default)]
    pub item_data: Value,
    #[serde(default)]
    pub result: WorkflowResult,
    #[serde(default)]
    pub current_url: Option<String>,
    #[serde(default)]
    pub screenshot_path: Option<PathBuf>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl HandoffState {
    /// Snapshot of `progress`; the result is copied, not referenced.
    pub fn capture(progress: &Progress, reason: impl Into<String>) -> Self {
        Self {
            version: HANDOFF_STATE_VERSION,
            reason: reason.into(),
            context: Value::Null,
            blocker: None,
            checkpoint: progress.checkpoint.clone(),
            item_data: progress.item_data.clone(),
            result: progress.result.clone(),
            current_url: None,
            screenshot_path: None,
            timestamp: Utc::now(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_blocker(mut self, blocker: Option<Blocker>) -> Self {
        self.blocker = blocker;
        self
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.current_url = url;
        self
    }

    pub fn with_screenshot(mut self, path: Option<PathBuf>) -> Self {
        self.screenshot_path = path;
        self
    }

    pub fn resume_index(&self) -> usize {
        self.checkpoint.item_index.unwrap_or(0)
    }

    pub fn progress(&self) -> Progress {
        Progress {
            checkpoint: self.checkpoint.clone(),
            result: self.result.clone(),
            item_data: self.item_data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stage_transition_clears_finer_fields_but_keeps_item() {
        let mut cp = Checkpoint::for_item(3);
        cp.set_step("fill_invoice");
        cp.set_field("partner");
        cp.set_line(2);
        cp.begin_sub_step("select");
        cp.complete_sub_step("type");
        cp.enter_stage(Stage::FillForm);
        assert_eq!(cp.stage, Stage::FillForm);
        assert_eq!(cp.item_index, Some(3));
        assert!(cp.step.is_none());
        assert!(cp.field.is_none());
        assert!(cp.line_index.is_none());
        assert!(cp.sub_step.is_none());
        assert!(cp.last_completed_sub_step.is_none());
    }

    #[test]
    fn new_field_restarts_sub_steps() {
        let mut cp = Checkpoint::new();
        cp.set_field("partner");
        cp.complete_sub_step("open");
        cp.set_field("date");
        assert!(cp.last_completed_sub_step.is_none());
    }

    #[test]
    fn sub_step_done_uses_declared_order() {
        let mut cp = Checkpoint::new();
        cp.complete_sub_step("type");
        let order = ["open", "type", "select", "verify"];
        assert!(cp.sub_step_done(&order, "open"));
        assert!(cp.sub_step_done(&order, "type"));
        assert!(!cp.sub_step_done(&order, "select"));
        assert!(!cp.sub_step_done(&order, "unknown"));
    }

    #[test]
    fn finalize_tallies_fields() {
        let mut result = WorkflowResult::default();
        result.record_attempt("partner");
        result.record_attempt("date");
        result.record_filled("partner", json!("Acme"));
        result.record_failed("date", "input not found");
        result.finalize();
        assert_eq!(result.status, ResultStatus::Partial);

        let mut none = WorkflowResult::default();
        none.record_attempt("partner");
        none.finalize();
        assert_eq!(none.status, ResultStatus::Failed);

        let mut paused = WorkflowResult {
            status: ResultStatus::AwaitingHuman,
            ..WorkflowResult::default()
        };
        paused.finalize();
        assert_eq!(paused.status, ResultStatus::AwaitingHuman);
    }

    #[test]
    fn unknown_keys_survive_a_cycle() {
        let raw = json!({
            "version": 1,
            "reason": "captcha",
            "checkpoint": {
                "stage": "fill_form",
                "field": "partner",
                "timestamp": "2026-01-02T03:04:05Z",
                "operator_note": "tab was closed"
            },
            "timestamp": "2026-01-02T03:04:05Z",
            "invoice_layout": "v2"
        });
        let state: HandoffState = serde_json::from_value(raw).unwrap();
        assert_eq!(state.extra["invoice_layout"], json!("v2"));
        assert_eq!(state.checkpoint.extra["operator_note"], json!("tab was closed"));
        let back = serde_json::to_value(&state).unwrap();
        assert_eq!(back["invoice_layout"], json!("v2"));
        assert_eq!(back["checkpoint"]["operator_note"], json!("tab was closed"));
    }
}
