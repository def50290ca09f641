//! Step sequencer
//!
//! Drives a [`Workflow`] one step at a time:
//! PENDING -> VALIDATING -> (ACTING | RECOVERING) -> (NEXT | RETRY | PAUSED | STOPPED | SKIPPED)

use std::collections::HashMap;

use action_primitives::ActionError;
use async_recursion::async_recursion;
use checkpoint_store::{ResultStatus, Stage};
use human_handoff::HandoffOutcome;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::context::SessionContext;
use crate::errors::FlowError;
use crate::recovery::{Condition, Observation, RecoveryTable};
use crate::strategies::RetryPolicy;
use crate::types::{StepDefinition, Transition, Workflow};
use crate::variables::substitute;

const SUB_STEP_PREFIX: &str = "action_";

#[derive(Debug, Clone)]
pub struct SequencerOptions {
    /// Allowed transitions per (from, to) pair before the run is stopped
    pub max_transition_hops: u32,
    /// Probe for blockers before every action
    pub check_blockers: bool,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            max_transition_hops: 25,
            check_blockers: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Pending,
    Validating,
    Acting,
    Recovering,
    Next,
    Retry,
    Paused,
    Stopped,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStatus {
    Completed,
    /// Finished early through a `skip` transition; counts as success
    Skipped,
    Stopped { reason: String },
    Paused { reason: String },
}

impl FlowStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, FlowStatus::Completed | FlowStatus::Skipped)
    }
}

#[derive(Debug, Clone)]
pub struct FlowOutcome {
    pub run_id: String,
    pub status: FlowStatus,
    pub last_step: Option<String>,
    /// Steps entered, in order, including re-entries
    pub steps_entered: Vec<String>,
}

#[derive(Debug)]
enum StepResult {
    Succeeded,
    ValidationFailed(String),
    ActionFailed(String),
    Abandoned(String),
}

#[derive(Debug)]
enum Decision {
    Enter(usize),
    Complete,
    Skip,
    Stop(String),
    Pause { reason: String, resume_next: bool },
}

enum ActionsOutcome {
    Done,
    Abandoned(String),
}

#[derive(Default)]
pub struct StepSequencer {
    options: SequencerOptions,
}

impl StepSequencer {
    pub fn new(options: SequencerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SequencerOptions {
        &self.options
    }

    /// Runs `workflow` to a terminal status.
    ///
    /// When the checkpoint already names a step of this workflow the run
    /// resumes there, skipping actions completed before the interruption.
    pub async fn run(
        &self,
        workflow: &Workflow,
        ctx: &mut SessionContext,
    ) -> Result<FlowOutcome, FlowError> {
        workflow.validate()?;
        let table = workflow.recovery_table()?;
        for (key, value) in &workflow.variables {
            ctx.variables
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let (mut index, mut skip_through) = resume_point(workflow, ctx);
        if ctx.progress.checkpoint.stage != Stage::Navigate {
            ctx.progress.checkpoint.enter_stage(Stage::Navigate);
        }
        info!(
            run_id = %run_id,
            workflow = %workflow.name,
            start = %workflow.steps[index].name,
            resumed = skip_through.is_some(),
            "Starting workflow"
        );

        let mut hops: HashMap<(usize, usize), u32> = HashMap::new();
        let mut entered = Vec::new();

        loop {
            let step = &workflow.steps[index];
            debug!(step = %step.name, phase = ?StepPhase::Pending, "Entering step");
            if skip_through.is_some() {
                ctx.progress.checkpoint.set_step(&step.name);
            } else {
                ctx.progress.checkpoint.enter_step(&step.name);
            }
            ctx.progress
                .result
                .log_step(format!("Executing step: {}", step.name));
            entered.push(step.name.clone());

            let result = self.execute_step(step, ctx, skip_through.take()).await?;

            let (transition, after_success, failure) = match result {
                StepResult::Succeeded => (
                    step.transitions
                        .on_success
                        .clone()
                        .unwrap_or(Transition::Next),
                    true,
                    None,
                ),
                StepResult::ValidationFailed(reason) => (
                    step.transitions
                        .on_validation_fail
                        .clone()
                        .unwrap_or(Transition::Recover),
                    false,
                    Some(reason),
                ),
                StepResult::ActionFailed(reason) => (
                    step.transitions.on_error.clone().unwrap_or(Transition::stop()),
                    false,
                    Some(reason),
                ),
                StepResult::Abandoned(reason) => {
                    return Ok(self.paused(ctx, run_id, step, entered, reason).await);
                }
            };

            let decision = self
                .resolve(
                    &transition,
                    index,
                    workflow,
                    &table,
                    ctx,
                    failure.as_deref(),
                    after_success,
                )
                .await?;

            let next = match decision {
                Decision::Enter(next) => next,
                Decision::Complete => {
                    return Ok(self.finish(ctx, run_id, step, entered, FlowStatus::Completed));
                }
                Decision::Skip => {
                    debug!(step = %step.name, phase = ?StepPhase::Skipped, "Skipping remaining steps");
                    ctx.progress
                        .result
                        .log_step(format!("Skipped remaining steps after {}", step.name));
                    return Ok(self.finish(ctx, run_id, step, entered, FlowStatus::Skipped));
                }
                Decision::Stop(reason) => {
                    return Ok(self.stopped(ctx, run_id, step, entered, reason));
                }
                Decision::Pause {
                    reason,
                    resume_next,
                } => {
                    let target = if resume_next { index + 1 } else { index };
                    if target >= workflow.steps.len() {
                        return Ok(self.finish(ctx, run_id, step, entered, FlowStatus::Completed));
                    }
                    ctx.progress
                        .checkpoint
                        .enter_step(&workflow.steps[target].name);
                    debug!(step = %step.name, phase = ?StepPhase::Paused, %reason, "Pausing workflow");
                    let outcome = ctx
                        .handoff
                        .pause_for_human(
                            ctx.executor.as_ref(),
                            &mut ctx.progress,
                            &reason,
                            json!({ "step": step.name, "resume_step": workflow.steps[target].name }),
                            None,
                        )
                        .await;
                    if outcome != HandoffOutcome::Resumed {
                        return Ok(self.paused(ctx, run_id, step, entered, reason).await);
                    }
                    target
                }
            };

            let count = hops.entry((index, next)).or_insert(0);
            *count += 1;
            if *count > self.options.max_transition_hops {
                let reason = format!(
                    "transition hop ceiling exceeded: {} -> {}",
                    step.name, workflow.steps[next].name
                );
                return Ok(self.stopped(ctx, run_id, step, entered, reason));
            }
            let phase = if next == index {
                StepPhase::Retry
            } else {
                StepPhase::Next
            };
            debug!(from = %step.name, to = %workflow.steps[next].name, ?phase, "Transition");
            index = next;
        }
    }

    async fn execute_step(
        &self,
        step: &StepDefinition,
        ctx: &mut SessionContext,
        skip_through: Option<usize>,
    ) -> Result<StepResult, FlowError> {
        let policy = RetryPolicy::from_rules(&step.transitions);
        let mut last = StepResult::ValidationFailed(format!("step {} never ran", step.name));

        for attempt in 0..policy.attempts() {
            policy.pause_before(&step.name, attempt).await;

            // validators describe the state before the first action, so a
            // step resumed mid-way skips them once
            let resumed_mid_step = attempt == 0 && skip_through.is_some();
            if !resumed_mid_step {
                debug!(step = %step.name, attempt, phase = ?StepPhase::Validating, "Validating");
                match self.validate(step, ctx).await {
                    Ok(None) => {}
                    Ok(Some(reason)) => {
                        warn!(step = %step.name, attempt, %reason, "Validation failed");
                        last = StepResult::ValidationFailed(reason);
                        if policy.should_retry(attempt, None) {
                            continue;
                        }
                        break;
                    }
                    Err(err) => return Err(session_lost(step, err)),
                }
            }

            debug!(step = %step.name, attempt, phase = ?StepPhase::Acting, "Acting");
            let skip = if attempt == 0 { skip_through } else { None };
            match self.run_actions(step, ctx, skip).await {
                Ok(ActionsOutcome::Done) => return Ok(StepResult::Succeeded),
                Ok(ActionsOutcome::Abandoned(reason)) => return Ok(StepResult::Abandoned(reason)),
                Err(err) if err.is_fatal() => return Err(session_lost(step, err)),
                Err(err) => {
                    warn!(step = %step.name, attempt, error = %err, "Step action failed");
                    let retry = policy.should_retry(attempt, Some(&err));
                    last = StepResult::ActionFailed(err.to_string());
                    if !retry {
                        break;
                    }
                }
            }
        }
        Ok(last)
    }

    async fn validate(
        &self,
        step: &StepDefinition,
        ctx: &SessionContext,
    ) -> Result<Option<String>, ActionError> {
        if step.validators.is_empty() {
            return Ok(None);
        }
        let conditions: Vec<Condition> = step
            .validators
            .iter()
            .map(|(predicate, expected)| predicate.condition(expected))
            .collect();
        let observation = Observation::gather(ctx.executor.as_ref(), conditions.iter()).await?;
        Ok(conditions
            .iter()
            .find(|condition| !condition.holds(&observation))
            .map(|condition| {
                format!(
                    "validator {:?} not satisfied at {}",
                    condition, observation.location.url
                )
            }))
    }

    async fn run_actions(
        &self,
        step: &StepDefinition,
        ctx: &mut SessionContext,
        skip_through: Option<usize>,
    ) -> Result<ActionsOutcome, ActionError> {
        for (i, action) in step.actions.iter().enumerate() {
            let sub_step = format!("{}{}", SUB_STEP_PREFIX, i);
            if skip_through.is_some_and(|done| i <= done) {
                debug!(step = %step.name, sub_step = %sub_step, "Already completed; skipping");
                continue;
            }
            ctx.progress.checkpoint.begin_sub_step(&sub_step);

            if self.options.check_blockers {
                let outcome = ctx
                    .handoff
                    .handoff_if_blocked(
                        ctx.executor.as_ref(),
                        &mut ctx.progress,
                        &format!("Blocked during step {}", step.name),
                        json!({ "step": step.name, "sub_step": sub_step }),
                        false,
                    )
                    .await;
                if outcome == HandoffOutcome::Abandoned {
                    return Ok(ActionsOutcome::Abandoned(format!(
                        "operator abandoned step {} at {}",
                        step.name, sub_step
                    )));
                }
            }

            let resolved = substitute(action, &ctx.variables)
                .map_err(|err| ActionError::InvalidParams(err.to_string()))?;
            let report = ctx.executor.execute(&resolved).await?;
            if !report.ok {
                return Err(ActionError::WaitTimeout(format!("{} not met", resolved)));
            }
            ctx.progress.checkpoint.complete_sub_step(&sub_step);
            ctx.persist_sub_step().await;
        }
        Ok(ActionsOutcome::Done)
    }

    #[allow(clippy::too_many_arguments)]
    #[async_recursion]
    async fn resolve(
        &self,
        transition: &Transition,
        index: usize,
        workflow: &Workflow,
        table: &RecoveryTable,
        ctx: &mut SessionContext,
        failure: Option<&str>,
        after_success: bool,
    ) -> Result<Decision, FlowError> {
        let step = &workflow.steps[index];
        let decision = match transition {
            Transition::Next => {
                if index + 1 < workflow.steps.len() {
                    Decision::Enter(index + 1)
                } else {
                    Decision::Complete
                }
            }
            Transition::Goto { target_step } => jump(workflow, index, target_step.as_deref()),
            Transition::Retry { retry_step } => jump(workflow, index, retry_step.as_deref()),
            Transition::Skip => Decision::Skip,
            Transition::Stop { reason } => Decision::Stop(
                reason
                    .clone()
                    .or_else(|| failure.map(str::to_string))
                    .unwrap_or_else(|| format!("stopped at step {}", step.name)),
            ),
            Transition::Pause { reason } => Decision::Pause {
                reason: reason
                    .clone()
                    .or_else(|| failure.map(str::to_string))
                    .unwrap_or_else(|| format!("paused at step {}", step.name)),
                resume_next: after_success,
            },
            Transition::Check { checks } => {
                let observation =
                    Observation::gather(ctx.executor.as_ref(), checks.iter().map(|c| &c.when))
                        .await
                        .map_err(|err| session_lost(step, err))?;
                match checks.iter().find(|check| check.when.holds(&observation)) {
                    Some(check) => {
                        debug!(step = %step.name, condition = ?check.when, "Check matched");
                        return self
                            .resolve(
                                &check.then,
                                index,
                                workflow,
                                table,
                                ctx,
                                failure,
                                after_success,
                            )
                            .await;
                    }
                    None => Decision::Stop(format!("no check matched after step {}", step.name)),
                }
            }
            Transition::Recover => {
                debug!(step = %step.name, phase = ?StepPhase::Recovering, "Recovering");
                let observation = Observation::gather(ctx.executor.as_ref(), table.conditions())
                    .await
                    .map_err(|err| session_lost(step, err))?;
                let target = table.route(&observation);
                ctx.progress
                    .result
                    .log_step(format!("Recovery: {} -> {}", step.name, target));
                jump(workflow, index, Some(target))
            }
        };
        Ok(decision)
    }

    fn finish(
        &self,
        ctx: &mut SessionContext,
        run_id: String,
        step: &StepDefinition,
        entered: Vec<String>,
        status: FlowStatus,
    ) -> FlowOutcome {
        info!(run_id = %run_id, last_step = %step.name, status = ?status, "Workflow finished");
        ctx.progress.checkpoint.sub_step = None;
        FlowOutcome {
            run_id,
            status,
            last_step: Some(step.name.clone()),
            steps_entered: entered,
        }
    }

    fn stopped(
        &self,
        ctx: &mut SessionContext,
        run_id: String,
        step: &StepDefinition,
        entered: Vec<String>,
        reason: String,
    ) -> FlowOutcome {
        warn!(step = %step.name, phase = ?StepPhase::Stopped, %reason, "Workflow stopped");
        let key = ctx
            .progress
            .checkpoint
            .field
            .clone()
            .unwrap_or_else(|| format!("step:{}", step.name));
        let result = &mut ctx.progress.result;
        result.record_failed(&key, reason.clone());
        result.log_step(format!("Stopped at {}: {}", step.name, reason));
        result.status = ResultStatus::Failed;
        self.finish(ctx, run_id, step, entered, FlowStatus::Stopped { reason })
    }

    async fn paused(
        &self,
        ctx: &mut SessionContext,
        run_id: String,
        step: &StepDefinition,
        entered: Vec<String>,
        reason: String,
    ) -> FlowOutcome {
        let result = &mut ctx.progress.result;
        if result.status != ResultStatus::AwaitingHuman {
            result.status = ResultStatus::AwaitingHuman;
            result.awaiting_human_decision = Some(json!({ "reason": reason, "step": step.name }));
            result.log_step(format!("Paused at {}: {}", step.name, reason));
            ctx.persist(&reason).await;
        }
        FlowOutcome {
            run_id,
            status: FlowStatus::Paused { reason },
            last_step: Some(step.name.clone()),
            steps_entered: entered,
        }
    }
}

fn jump(workflow: &Workflow, current: usize, target: Option<&str>) -> Decision {
    match target {
        None => Decision::Enter(current),
        Some(name) => match workflow.step_index(name) {
            Some(index) => Decision::Enter(index),
            None => Decision::Stop(format!("unknown step '{}'", name)),
        },
    }
}

fn session_lost(step: &StepDefinition, err: ActionError) -> FlowError {
    FlowError::SessionLost {
        step: step.name.clone(),
        reason: err.to_string(),
    }
}

/// Start index and last completed action for a run.
fn resume_point(workflow: &Workflow, ctx: &SessionContext) -> (usize, Option<usize>) {
    let checkpoint = &ctx.progress.checkpoint;
    if checkpoint.stage != Stage::Navigate {
        return (0, None);
    }
    let Some(index) = checkpoint.step.as_deref().and_then(|s| workflow.step_index(s)) else {
        return (0, None);
    };
    let done = checkpoint
        .last_completed_sub_step
        .as_deref()
        .and_then(|s| s.strip_prefix(SUB_STEP_PREFIX))
        .and_then(|n| n.parse::<usize>().ok());
    (index, done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::RecoveryCheck;
    use crate::types::Predicate;
    use action_primitives::{Action, DefaultActionExecutor, ExecutorOptions};
    use checkpoint_store::{
        Checkpoint, CheckpointStore, InMemoryCheckpointStore, Progress,
    };
    use formrunner_core_types::testing::{PageEffect, ScriptedSession};
    use formrunner_core_types::{SessionError, Target};
    use human_handoff::{AutoResume, ChannelResume, HandoffConfig, HandoffController, ResumeSignal};
    use serde_json::Value;
    use std::sync::Arc;

    const NEW_INVOICE: &str = "https://erp.test/odoo/accounting/customer-invoices/new";

    struct Harness {
        session: Arc<ScriptedSession>,
        store: Arc<InMemoryCheckpointStore>,
        _dir: tempfile::TempDir,
    }

    fn context(
        session: Arc<ScriptedSession>,
        progress: Progress,
        signal: Arc<dyn ResumeSignal>,
    ) -> (SessionContext, Harness) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryCheckpointStore::new());
        let executor = DefaultActionExecutor::with_options(
            session.clone(),
            ExecutorOptions {
                poll_interval_ms: 10,
                default_timeout_ms: 50,
                screenshot_dir: dir.path().to_path_buf(),
            },
        );
        let handoff = HandoffController::new(
            HandoffConfig {
                screenshot_dir: dir.path().to_path_buf(),
                ..HandoffConfig::default()
            },
            store.clone(),
            signal,
        );
        let ctx = SessionContext::new(Arc::new(executor), Arc::new(handoff), progress);
        (
            ctx,
            Harness {
                session,
                store,
                _dir: dir,
            },
        )
    }

    fn workflow(steps: Vec<StepDefinition>, recovery: Vec<RecoveryCheck>) -> Workflow {
        Workflow {
            name: "invoice".into(),
            description: String::new(),
            steps,
            recovery,
            variables: Default::default(),
        }
    }

    fn invoice_workflow() -> Workflow {
        workflow(
            vec![
                StepDefinition::new("navigate_to_new_invoice").action(Action::navigate(NEW_INVOICE)),
                StepDefinition::new("open_customers_dropdown")
                    .expect(Predicate::ElementVisible, ".o_customer_dropdown")
                    .action(Action::click(Target::selector(".o_customer_dropdown"))),
                StepDefinition::new("verify_invoice_form_loaded")
                    .expect(Predicate::UrlContains, "customer-invoices/new")
                    .action(Action::click(Target::selector("#save"))),
            ],
            vec![
                RecoveryCheck::new(
                    Condition::UrlContains("customer-invoices/new".into()),
                    "verify_invoice_form_loaded",
                ),
                RecoveryCheck::new(Condition::Default, "navigate_to_new_invoice"),
            ],
        )
    }

    #[tokio::test]
    async fn failed_validation_routes_through_recovery() {
        let session = Arc::new(ScriptedSession::at("about:blank"));
        let (mut ctx, harness) = context(session, Progress::default(), Arc::new(AutoResume));

        let outcome = StepSequencer::default()
            .run(&invoice_workflow(), &mut ctx)
            .await
            .unwrap();

        assert_eq!(outcome.status, FlowStatus::Completed);
        assert_eq!(
            outcome.steps_entered,
            vec![
                "navigate_to_new_invoice",
                "open_customers_dropdown",
                "verify_invoice_form_loaded"
            ]
        );
        assert!(ctx
            .progress
            .result
            .steps_taken
            .iter()
            .any(|s| s == "Recovery: open_customers_dropdown -> verify_invoice_form_loaded"));
        assert_eq!(harness.session.count("click:.o_customer_dropdown"), 0);
        assert_eq!(harness.session.count("click:#save"), 1);
    }

    #[tokio::test]
    async fn flaky_action_is_retried_within_budget() {
        let session = Arc::new(ScriptedSession::new());
        session.fail_times("click:#flaky", 2, SessionError::NotFound("#flaky".into()));
        let (mut ctx, harness) = context(session, Progress::default(), Arc::new(AutoResume));
        let flow = workflow(
            vec![StepDefinition::new("press")
                .action(Action::click(Target::selector("#flaky")))
                .retries(2, 0)],
            Vec::new(),
        );

        let outcome = StepSequencer::default().run(&flow, &mut ctx).await.unwrap();
        assert!(outcome.status.is_success());
        assert_eq!(harness.session.count("click:#flaky"), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_take_the_error_transition() {
        let session = Arc::new(ScriptedSession::new());
        session.fail_times("click:#broken", 5, SessionError::NotFound("#broken".into()));
        let (mut ctx, harness) = context(session, Progress::default(), Arc::new(AutoResume));
        let flow = workflow(
            vec![
                StepDefinition::new("press")
                    .action(Action::click(Target::selector("#broken")))
                    .retries(1, 0)
                    .on_error(Transition::goto("fallback")),
                StepDefinition::new("unreached").action(Action::click(Target::selector("#nope"))),
                StepDefinition::new("fallback").action(Action::click(Target::selector("#alt"))),
            ],
            Vec::new(),
        );

        let outcome = StepSequencer::default().run(&flow, &mut ctx).await.unwrap();
        assert_eq!(outcome.status, FlowStatus::Completed);
        assert_eq!(outcome.steps_entered, vec!["press", "fallback"]);
        assert_eq!(harness.session.count("click:#alt"), 1);
        assert_eq!(harness.session.count("click:#nope"), 0);
    }

    #[tokio::test]
    async fn stop_records_failure_on_the_result() {
        let session = Arc::new(ScriptedSession::new());
        session.fail_times("click:#broken", 1, SessionError::NotFound("#broken".into()));
        let (mut ctx, _harness) = context(session, Progress::default(), Arc::new(AutoResume));
        let flow = workflow(
            vec![StepDefinition::new("press")
                .action(Action::click(Target::selector("#broken")))
                .on_error(Transition::Stop {
                    reason: Some("save button missing".into()),
                })],
            Vec::new(),
        );

        let outcome = StepSequencer::default().run(&flow, &mut ctx).await.unwrap();
        assert_eq!(
            outcome.status,
            FlowStatus::Stopped {
                reason: "save button missing".into()
            }
        );
        assert_eq!(ctx.progress.result.status, ResultStatus::Failed);
        assert_eq!(
            ctx.progress.result.fields_failed.get("step:press").map(String::as_str),
            Some("save button missing")
        );
    }

    #[tokio::test]
    async fn skip_finishes_as_success() {
        let session = Arc::new(ScriptedSession::new());
        let (mut ctx, harness) = context(session, Progress::default(), Arc::new(AutoResume));
        let flow = workflow(
            vec![
                StepDefinition::new("first")
                    .action(Action::click(Target::selector("#a")))
                    .on_success(Transition::Skip),
                StepDefinition::new("second").action(Action::click(Target::selector("#b"))),
            ],
            Vec::new(),
        );

        let outcome = StepSequencer::default().run(&flow, &mut ctx).await.unwrap();
        assert_eq!(outcome.status, FlowStatus::Skipped);
        assert!(outcome.status.is_success());
        assert_eq!(harness.session.count("click:#b"), 0);
    }

    #[tokio::test]
    async fn check_transition_picks_first_satisfied_branch() {
        let session = Arc::new(ScriptedSession::new());
        session.on(
            "click:#submit",
            vec![PageEffect::SetText("Record saved".into())],
        );
        let (mut ctx, _harness) = context(session, Progress::default(), Arc::new(AutoResume));
        let flow = workflow(
            vec![
                StepDefinition::new("submit")
                    .action(Action::click(Target::selector("#submit")))
                    .on_success(Transition::Check {
                        checks: vec![
                            crate::types::ConditionalCheck {
                                when: Condition::TextVisible("Validation error".into()),
                                then: Transition::stop(),
                            },
                            crate::types::ConditionalCheck {
                                when: Condition::TextVisible("Record saved".into()),
                                then: Transition::goto("done"),
                            },
                        ],
                    }),
                StepDefinition::new("skipped_over"),
                StepDefinition::new("done"),
            ],
            Vec::new(),
        );

        let outcome = StepSequencer::default().run(&flow, &mut ctx).await.unwrap();
        assert_eq!(outcome.status, FlowStatus::Completed);
        assert_eq!(outcome.steps_entered, vec!["submit", "done"]);
    }

    #[tokio::test]
    async fn self_loop_hits_the_hop_ceiling() {
        let session = Arc::new(ScriptedSession::new());
        let (mut ctx, _harness) = context(session, Progress::default(), Arc::new(AutoResume));
        let flow = workflow(
            vec![StepDefinition::new("spin").on_success(Transition::Retry { retry_step: None })],
            Vec::new(),
        );
        let sequencer = StepSequencer::new(SequencerOptions {
            max_transition_hops: 3,
            ..SequencerOptions::default()
        });

        let outcome = sequencer.run(&flow, &mut ctx).await.unwrap();
        match outcome.status {
            FlowStatus::Stopped { reason } => assert!(reason.contains("hop ceiling")),
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(outcome.steps_entered.len(), 4);
    }

    #[tokio::test]
    async fn missing_recovery_list_restarts_at_first_step() {
        let session = Arc::new(ScriptedSession::at("about:blank"));
        let (mut ctx, harness) = context(session, Progress::default(), Arc::new(AutoResume));
        let flow = workflow(
            vec![
                StepDefinition::new("start").action(Action::navigate(NEW_INVOICE)),
                StepDefinition::new("later").expect(Predicate::UrlContains, "/never"),
            ],
            Vec::new(),
        );
        let sequencer = StepSequencer::new(SequencerOptions {
            max_transition_hops: 2,
            ..SequencerOptions::default()
        });

        let outcome = sequencer.run(&flow, &mut ctx).await.unwrap();
        assert_eq!(outcome.steps_entered[..3], ["start", "later", "start"]);
        assert!(ctx
            .progress
            .result
            .steps_taken
            .iter()
            .any(|s| s == "Recovery: later -> start"));
        assert!(harness.session.count("navigate:") >= 2);
        match outcome.status {
            FlowStatus::Stopped { reason } => assert!(reason.contains("hop ceiling")),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn blocker_mid_step_persists_the_sub_step() {
        let session = Arc::new(ScriptedSession::new());
        session.on("click:#first", vec![PageEffect::OpenDialog {
            selector: ".modal".into(),
            text: "Please complete the captcha".into(),
        }]);
        let (signal, handle) = ChannelResume::new();
        drop(handle);
        let (mut ctx, harness) = context(
            session,
            Progress::new(Checkpoint::for_item(3), Value::Null),
            Arc::new(signal),
        );
        let flow = workflow(
            vec![StepDefinition::new("fill")
                .action(Action::click(Target::selector("#first")))
                .action(Action::click(Target::selector("#second")))],
            Vec::new(),
        );

        let outcome = StepSequencer::default().run(&flow, &mut ctx).await.unwrap();
        assert!(matches!(outcome.status, FlowStatus::Paused { .. }));
        assert_eq!(ctx.progress.result.status, ResultStatus::AwaitingHuman);
        assert_eq!(harness.session.count("click:#second"), 0);

        let state = harness.store.load().await.unwrap();
        assert_eq!(state.checkpoint.stage, Stage::Navigate);
        assert_eq!(state.checkpoint.step.as_deref(), Some("fill"));
        assert_eq!(state.checkpoint.sub_step.as_deref(), Some("action_1"));
        assert_eq!(
            state.checkpoint.last_completed_sub_step.as_deref(),
            Some("action_0")
        );
        assert_eq!(state.resume_index(), 3);
    }

    #[tokio::test]
    async fn resumed_step_skips_completed_actions() {
        let session = Arc::new(ScriptedSession::new());
        let mut checkpoint = Checkpoint::for_item(0);
        checkpoint.enter_stage(Stage::Navigate);
        checkpoint.set_step("fill");
        checkpoint.complete_sub_step("action_0");
        let (mut ctx, harness) = context(
            session,
            Progress::new(checkpoint, Value::Null),
            Arc::new(AutoResume),
        );
        let flow = workflow(
            vec![
                StepDefinition::new("open").action(Action::click(Target::selector("#open"))),
                StepDefinition::new("fill")
                    .expect(Predicate::ElementExists, "#never-registered")
                    .action(Action::click(Target::selector("#first")))
                    .action(Action::click(Target::selector("#second"))),
            ],
            Vec::new(),
        );

        let outcome = StepSequencer::default().run(&flow, &mut ctx).await.unwrap();
        assert_eq!(outcome.status, FlowStatus::Completed);
        assert_eq!(outcome.steps_entered, vec!["fill"]);
        assert_eq!(
            harness.session.log(),
            vec!["click:#second".to_string()]
        );
    }

    #[tokio::test]
    async fn lost_session_is_an_error() {
        let session = Arc::new(ScriptedSession::new());
        session.disconnect();
        let (mut ctx, _harness) = context(session, Progress::default(), Arc::new(AutoResume));
        let flow = workflow(
            vec![StepDefinition::new("press").action(Action::click(Target::selector("#a")))],
            Vec::new(),
        );

        let err = StepSequencer::default().run(&flow, &mut ctx).await.unwrap_err();
        assert!(matches!(err, FlowError::SessionLost { .. }));
    }

    #[tokio::test]
    async fn item_values_fill_placeholders() {
        let session = Arc::new(ScriptedSession::new());
        let (mut ctx, harness) = context(
            session,
            Progress::new(Checkpoint::for_item(0), serde_json::json!({"customer": "Acme"})),
            Arc::new(AutoResume),
        );
        let flow = workflow(
            vec![StepDefinition::new("pick").action(Action::type_text("#partner", "{{customer}}"))],
            Vec::new(),
        );

        StepSequencer::default().run(&flow, &mut ctx).await.unwrap();
        assert_eq!(harness.session.value_of("#partner").as_deref(), Some("Acme"));
    }
}
