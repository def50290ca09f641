//! Generic form filler
//!
//! Fills the fields of a [`FormPlan`] in order, line by line for array
//! values, and checkpoints after every sub-step. A resumed item skips the
//! fields and lines before the saved position and the sub-steps already
//! completed inside it.

use std::collections::BTreeMap;

use action_flow::{item_variables, substitute, SessionContext};
use action_primitives::ActionError;
use checkpoint_store::{Checkpoint, Stage};
use human_handoff::HandoffOutcome;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::plan::{FieldPlan, FormPlan};

#[derive(Debug, Clone)]
pub struct FillerOptions {
    /// Extra attempts for a failing line before the field is given up
    pub item_retries: u32,
}

impl Default for FillerOptions {
    fn default() -> Self {
        Self { item_retries: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    Completed,
    Abandoned(String),
}

/// Saved position inside the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    pub field: String,
    pub line_index: Option<usize>,
    pub last_completed_sub_step: Option<String>,
}

impl ResumePoint {
    /// Present only when the checkpoint stopped inside the form.
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Option<Self> {
        if checkpoint.stage != Stage::FillForm {
            return None;
        }
        Some(Self {
            field: checkpoint.field.clone()?,
            line_index: checkpoint.line_index,
            last_completed_sub_step: checkpoint.last_completed_sub_step.clone(),
        })
    }
}

enum FieldEnd {
    Filled,
    Failed(String),
    Abandoned(String),
}

#[derive(Default)]
pub struct FormFiller {
    options: FillerOptions,
}

impl FormFiller {
    pub fn new(options: FillerOptions) -> Self {
        Self { options }
    }

    /// Fills every field with a value in the current item.
    ///
    /// Field failures are itemized on the result and filling moves on. Only
    /// a lost session is returned as an error.
    pub async fn fill(
        &self,
        plan: &FormPlan,
        ctx: &mut SessionContext,
        resume: Option<&ResumePoint>,
    ) -> Result<FillOutcome, ActionError> {
        let start = match resume {
            Some(point) => {
                let index = plan.field_index(&point.field);
                if index.is_none() {
                    warn!(field = %point.field, plan = %plan.name, "Saved field not in plan; filling from the top");
                }
                index
            }
            None => None,
        };
        if start.is_none() || ctx.progress.checkpoint.stage != Stage::FillForm {
            ctx.progress.checkpoint.enter_stage(Stage::FillForm);
        }
        info!(
            plan = %plan.name,
            item_index = ?ctx.progress.checkpoint.item_index,
            resume_field = ?start.map(|i| plan.fields[i].name.as_str()),
            "Filling form"
        );

        for (index, field) in plan.fields.iter().enumerate() {
            if start.is_some_and(|s| index < s) {
                debug!(field = %field.name, "Filled in an earlier run; skipping");
                continue;
            }
            let Some(value) = field.value_in(&ctx.progress.item_data).cloned() else {
                debug!(field = %field.name, "No value for field; skipping");
                continue;
            };
            let resume_line = if start == Some(index) {
                resume.and_then(|point| point.line_index)
            } else {
                ctx.progress.checkpoint.set_field(&field.name);
                None
            };
            ctx.progress.result.record_attempt(&field.name);

            match self.fill_field(field, &value, ctx, resume_line).await? {
                FieldEnd::Filled => {
                    info!(field = %field.name, "Field filled");
                    ctx.progress.result.record_filled(&field.name, value);
                }
                FieldEnd::Failed(reason) => {
                    warn!(field = %field.name, %reason, "Field failed");
                    ctx.progress.result.record_failed(&field.name, reason);
                }
                FieldEnd::Abandoned(reason) => return Ok(FillOutcome::Abandoned(reason)),
            }
        }

        ctx.progress.checkpoint.clear_field();
        Ok(FillOutcome::Completed)
    }

    async fn fill_field(
        &self,
        field: &FieldPlan,
        value: &Value,
        ctx: &mut SessionContext,
        resume_line: Option<usize>,
    ) -> Result<FieldEnd, ActionError> {
        let lines: Vec<(Option<usize>, &Value)> = match value {
            Value::Array(items) => items.iter().enumerate().map(|(i, v)| (Some(i), v)).collect(),
            single => vec![(None, single)],
        };

        for (line, line_value) in lines {
            if let Some(line) = line {
                if resume_line.is_some_and(|saved| line < saved) {
                    debug!(field = %field.name, line, "Line filled in an earlier run; skipping");
                    continue;
                }
                ctx.progress.checkpoint.set_line(line);
            }
            let vars = field_variables(&ctx.variables, field, line_value, line);
            match self.fill_line(field, ctx, &vars, line).await? {
                FieldEnd::Filled => {}
                FieldEnd::Failed(reason) => {
                    let reason = match line {
                        Some(line) => format!("line {}: {}", line, reason),
                        None => reason,
                    };
                    return Ok(FieldEnd::Failed(reason));
                }
                abandoned => return Ok(abandoned),
            }
        }
        Ok(FieldEnd::Filled)
    }

    /// Runs the sub-steps of one line with bounded retries, then asks the
    /// handoff controller for help once.
    async fn fill_line(
        &self,
        field: &FieldPlan,
        ctx: &mut SessionContext,
        vars: &BTreeMap<String, String>,
        line: Option<usize>,
    ) -> Result<FieldEnd, ActionError> {
        let mut attempt = 0u32;
        let mut handoff_tried = false;
        loop {
            let err = match self.run_sub_steps(field, ctx, vars, line).await {
                Ok(()) => return Ok(FieldEnd::Filled),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => err,
            };

            if attempt < self.options.item_retries {
                attempt += 1;
                warn!(field = %field.name, ?line, attempt, error = %err, "Retrying field");
                continue;
            }
            if handoff_tried {
                return Ok(FieldEnd::Failed(err.to_string()));
            }
            handoff_tried = true;

            let outcome = ctx
                .handoff
                .handoff_if_blocked(
                    ctx.executor.as_ref(),
                    &mut ctx.progress,
                    &format!("Field {} failed", field.name),
                    json!({ "field": field.name, "line_index": line, "error": err.to_string() }),
                    false,
                )
                .await;
            match outcome {
                HandoffOutcome::Resumed => {
                    info!(field = %field.name, "Blocker resolved; retrying field once more");
                }
                HandoffOutcome::Abandoned => {
                    return Ok(FieldEnd::Abandoned(format!(
                        "operator abandoned field {}",
                        field.name
                    )));
                }
                HandoffOutcome::NotTriggered | HandoffOutcome::Skipped => {
                    return Ok(FieldEnd::Failed(err.to_string()));
                }
            }
        }
    }

    async fn run_sub_steps(
        &self,
        field: &FieldPlan,
        ctx: &mut SessionContext,
        vars: &BTreeMap<String, String>,
        line: Option<usize>,
    ) -> Result<(), ActionError> {
        let order = field.sub_step_order();
        for sub_step in &field.sub_steps {
            if ctx.progress.checkpoint.sub_step_done(&order, &sub_step.name) {
                debug!(field = %field.name, sub_step = %sub_step.name, "Sub-step already completed");
                continue;
            }
            ctx.progress.checkpoint.begin_sub_step(&sub_step.name);
            debug!(field = %field.name, ?line, sub_step = %sub_step.name, "Running sub-step");

            for action in &sub_step.actions {
                let resolved = substitute(action, vars)
                    .map_err(|err| ActionError::InvalidParams(err.to_string()))?;
                let report = ctx.executor.execute(&resolved).await?;
                if !report.ok {
                    return Err(ActionError::WaitTimeout(format!("{} not met", resolved)));
                }
            }

            ctx.progress.checkpoint.complete_sub_step(&sub_step.name);
            ctx.persist_sub_step().await;
        }
        Ok(())
    }
}

/// Item variables plus `value`, `field` and, for line items, `line_index`,
/// `line_number` and the line's own keys.
fn field_variables(
    base: &BTreeMap<String, String>,
    field: &FieldPlan,
    value: &Value,
    line: Option<usize>,
) -> BTreeMap<String, String> {
    let mut vars = base.clone();
    vars.insert("field".to_string(), field.name.clone());
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    vars.insert("value".to_string(), rendered);
    if let Some(line) = line {
        vars.insert("line_index".to_string(), line.to_string());
        vars.insert("line_number".to_string(), (line + 1).to_string());
    }
    vars.extend(item_variables(value));
    vars
}
