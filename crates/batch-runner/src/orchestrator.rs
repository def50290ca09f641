//! Batch orchestration
//!
//! Items run one at a time against the single session. A failing item is
//! recorded and the batch moves on; a resumed batch skips what an earlier
//! run already finished.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use action_flow::{
    FlowStatus, SequencerOptions, SessionContext, StepSequencer, Workflow, PROGRESS_REASON,
};
use action_primitives::{Action, ActionExecutor};
use checkpoint_store::{Checkpoint, CheckpointStore, HandoffState, Progress, ResultStatus, Stage};
use human_handoff::HandoffController;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::BatchError;
use crate::filler::{FillOutcome, FillerOptions, FormFiller, ResumePoint};
use crate::model::{BatchResult, ItemOutcome};
use crate::plan::FormPlan;

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Process at most this many items
    pub limit: Option<usize>,
    /// Actions run after every item to reach the next work unit
    pub next_unit: Vec<Action>,
    pub filler: FillerOptions,
    pub sequencer: SequencerOptions,
    pub persist_every_sub_step: bool,
    /// Extra `{{name}}` values for every item
    pub variables: BTreeMap<String, String>,
}

pub struct BatchOrchestrator {
    executor: Arc<dyn ActionExecutor>,
    handoff: Arc<HandoffController>,
    workflow: Option<Workflow>,
    plan: FormPlan,
    options: BatchOptions,
    sequencer: StepSequencer,
    filler: FormFiller,
}

impl BatchOrchestrator {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        handoff: Arc<HandoffController>,
        plan: FormPlan,
        options: BatchOptions,
    ) -> Result<Self, BatchError> {
        plan.validate()?;
        Ok(Self {
            executor,
            handoff,
            workflow: None,
            sequencer: StepSequencer::new(options.sequencer.clone()),
            filler: FormFiller::new(options.filler.clone()),
            plan,
            options,
        })
    }

    /// Workflow run before the form of every fresh item.
    pub fn with_workflow(mut self, workflow: Workflow) -> Result<Self, BatchError> {
        workflow.validate()?;
        self.workflow = Some(workflow);
        Ok(self)
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        self.handoff.store()
    }

    pub async fn saved_state(&self) -> Option<HandoffState> {
        self.store().load().await
    }

    /// Processes `items` from the first one.
    pub async fn process(&self, items: &[Value]) -> BatchResult {
        self.process_from(items, None).await
    }

    /// Continues the batch recorded in the store.
    pub async fn resume(&self, items: &[Value]) -> Result<BatchResult, BatchError> {
        let Some(state) = self.saved_state().await else {
            info!(record = %self.store().location(), "No handoff state found; nothing to resume");
            return Err(BatchError::NothingToResume);
        };
        Ok(self.process_from(items, Some(state)).await)
    }

    pub async fn process_from(&self, items: &[Value], resume: Option<HandoffState>) -> BatchResult {
        let count = self
            .options
            .limit
            .map_or(items.len(), |limit| limit.min(items.len()));
        let resume_index = resume.as_ref().map(HandoffState::resume_index);
        info!(total = count, ?resume_index, plan = %self.plan.name, "Starting batch");

        let mut batch = BatchResult::with_total(count);
        let mut saved = resume;
        let mut unfinished: Option<HandoffState> = None;
        for (index, item) in items.iter().take(count).enumerate() {
            if resume_index.is_some_and(|resume_at| index < resume_at) {
                info!(item_index = index, "Completed in an earlier run; skipping");
                batch.skipped.push(index);
                continue;
            }
            let progress = match saved.take() {
                Some(state) if state.resume_index() == index => resumed_progress(state, item),
                _ => Progress::new(Checkpoint::for_item(index), item.clone()),
            };

            let (outcome, progress) = self.run_item(index, progress, unfinished.is_none()).await;
            info!(
                item_index = index,
                status = %outcome.status,
                failed_fields = outcome.result.fields_failed.len(),
                "Item finished"
            );
            if unfinished.is_none() && !outcome.is_success() {
                unfinished = Some(self.unfinished_state(&outcome, &progress).await);
            }
            batch.push(outcome);
            self.advance(index).await;
        }

        if batch.failed == 0 {
            self.store().clear().await;
            info!(successful = batch.successful, "Batch completed without failures; handoff state cleared");
        } else {
            if let Some(state) = &unfinished {
                self.store().save(state).await;
            }
            warn!(
                successful = batch.successful,
                failed = batch.failed,
                resume_index = ?unfinished.as_ref().map(HandoffState::resume_index),
                record = %self.store().location(),
                "Batch finished with failures; handoff state kept"
            );
        }
        batch
    }

    /// Runs one item. `persist_progress` is off once an earlier item of
    /// this batch is unfinished, so its record is not overwritten.
    async fn run_item(
        &self,
        index: usize,
        progress: Progress,
        persist_progress: bool,
    ) -> (ItemOutcome, Progress) {
        let started = Instant::now();
        let resume_point = ResumePoint::from_checkpoint(&progress.checkpoint);
        let mut ctx = SessionContext::new(self.executor.clone(), self.handoff.clone(), progress)
            .with_variables(&self.options.variables);
        ctx.persist_every_sub_step = self.options.persist_every_sub_step && persist_progress;
        if ctx.progress.checkpoint.stage == Stage::Init {
            ctx.progress.checkpoint.enter_stage(Stage::Batch);
        }
        info!(
            item_index = index,
            stage = %ctx.progress.checkpoint.stage,
            resume_field = ?resume_point.as_ref().map(|point| point.field.as_str()),
            "Processing item"
        );

        let error = match self.drive(index, &mut ctx, resume_point.as_ref()).await {
            Ok(()) => None,
            Err(err) => {
                error!(item_index = index, error = %err, "Item aborted");
                let result = &mut ctx.progress.result;
                result.status = ResultStatus::Failed;
                result.log_step(format!("Aborted: {}", err));
                Some(err.to_string())
            }
        };

        let result = &mut ctx.progress.result;
        result.execution_time_ms += started.elapsed().as_millis() as u64;
        result.finalize();
        if result.is_success() {
            ctx.progress.checkpoint.enter_stage(Stage::Complete);
        }
        let outcome = ItemOutcome {
            index,
            status: ctx.progress.result.status,
            error,
            result: ctx.progress.result.clone(),
        };
        (outcome, ctx.progress)
    }

    /// Record for the first item that did not succeed. A resumed batch
    /// starts from it. Details of a pause saved for the same item are kept.
    async fn unfinished_state(&self, outcome: &ItemOutcome, progress: &Progress) -> HandoffState {
        let reason = outcome
            .error
            .clone()
            .unwrap_or_else(|| format!("item {} ended {}", outcome.index, outcome.status));
        let mut state = HandoffState::capture(progress, reason);
        if let Some(saved) = self.saved_state().await {
            if saved.resume_index() == outcome.index && saved.reason != PROGRESS_REASON {
                state.reason = saved.reason;
                state.context = saved.context;
                state.blocker = saved.blocker;
                state.current_url = saved.current_url;
                state.screenshot_path = saved.screenshot_path;
            }
        }
        state
    }

    async fn drive(
        &self,
        index: usize,
        ctx: &mut SessionContext,
        resume_point: Option<&ResumePoint>,
    ) -> Result<(), BatchError> {
        match (&self.workflow, resume_point) {
            (Some(workflow), None) => {
                let flow = self.sequencer.run(workflow, ctx).await?;
                match flow.status {
                    FlowStatus::Completed => {}
                    FlowStatus::Skipped => {
                        info!(item_index = index, "Workflow skipped the item");
                        return Ok(());
                    }
                    FlowStatus::Stopped { .. } | FlowStatus::Paused { .. } => return Ok(()),
                }
            }
            (Some(_), Some(point)) => {
                info!(item_index = index, field = %point.field, "Resuming inside the form; navigation not repeated");
            }
            (None, _) => {}
        }

        let outcome = self
            .filler
            .fill(&self.plan, ctx, resume_point)
            .await
            .map_err(|err| BatchError::SessionLost {
                item_index: index,
                reason: err.to_string(),
            })?;
        if let FillOutcome::Abandoned(reason) = outcome {
            warn!(item_index = index, %reason, "Item abandoned by operator");
            ctx.progress.result.status = ResultStatus::AwaitingHuman;
        }
        Ok(())
    }

    /// Moves to the next work unit; failures never stop the batch.
    async fn advance(&self, index: usize) {
        for action in &self.options.next_unit {
            match self.executor.execute(action).await {
                Ok(report) if report.ok => {}
                Ok(_) => {
                    warn!(item_index = index, %action, "Next-unit action did not complete");
                    return;
                }
                Err(err) => {
                    warn!(item_index = index, %action, error = %err, "Could not move to the next work unit");
                    return;
                }
            }
        }
    }
}

/// Saved progress with the current item data and a fresh chance to finish.
fn resumed_progress(state: HandoffState, item: &Value) -> Progress {
    let mut progress = state.progress();
    progress.item_data = item.clone();
    progress.result.status = ResultStatus::Running;
    progress.result.awaiting_human_decision = None;
    progress
        .result
        .log_step(format!("Resumed after: {}", state.reason));
    progress
}
