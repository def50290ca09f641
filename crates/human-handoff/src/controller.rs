//! Handoff controller: IDLE -> ACTIVE -> IDLE

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use action_primitives::{poll_until, ActionError, ActionExecutor, PollPolicy};
use checkpoint_store::{CheckpointStore, HandoffState, Progress, ResultStatus};
use chrono::Utc;
use formrunner_core_types::{Blocker, BlockerRules, Probe};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::blockers::{describe, BlockerProbe};
use crate::signal::{ResumeDecision, ResumeSignal};

#[derive(Debug, Clone)]
pub struct HandoffConfig {
    pub enabled: bool,
    /// Block until the resume signal arrives; `false` continues at once
    pub wait: bool,
    pub screenshot_dir: PathBuf,
    pub rules: BlockerRules,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wait: true,
            screenshot_dir: PathBuf::from("screenshots"),
            rules: BlockerRules::default(),
        }
    }
}

/// Broadcast to observers whenever a run pauses for a human.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PauseNotice {
    pub reason: String,
    pub step: Option<String>,
    pub field: Option<String>,
    pub sub_step: Option<String>,
    pub item_index: Option<usize>,
    pub blocker: Option<Blocker>,
    pub current_url: Option<String>,
    pub screenshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// No blocker and not forced
    NotTriggered,
    /// Disabled, or a handoff is already in progress
    Skipped,
    Resumed,
    Abandoned,
}

impl HandoffOutcome {
    pub fn triggered(self) -> bool {
        matches!(self, HandoffOutcome::Resumed | HandoffOutcome::Abandoned)
    }
}

pub struct HandoffController {
    config: HandoffConfig,
    probe: BlockerProbe,
    store: Arc<dyn CheckpointStore>,
    signal: Arc<dyn ResumeSignal>,
    active: AtomicBool,
    notices: broadcast::Sender<PauseNotice>,
}

struct ActiveGuard<'a>(&'a AtomicBool);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl HandoffController {
    pub fn new(
        config: HandoffConfig,
        store: Arc<dyn CheckpointStore>,
        signal: Arc<dyn ResumeSignal>,
    ) -> Self {
        let (notices, _) = broadcast::channel(16);
        Self {
            probe: BlockerProbe::new(config.rules.clone()),
            config,
            store,
            signal,
            active: AtomicBool::new(false),
            notices,
        }
    }

    pub fn config(&self) -> &HandoffConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PauseNotice> {
        self.notices.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn detect_blocker(&self, executor: &dyn ActionExecutor) -> Option<Blocker> {
        self.probe.detect(executor).await
    }

    /// Hands off when a blocker is on the page, or unconditionally with
    /// `force`.
    pub async fn handoff_if_blocked(
        &self,
        executor: &dyn ActionExecutor,
        progress: &mut Progress,
        reason: &str,
        context: Value,
        force: bool,
    ) -> HandoffOutcome {
        if !self.config.enabled || self.is_active() {
            return HandoffOutcome::Skipped;
        }
        let blocker = self.detect_blocker(executor).await;
        if blocker.is_none() && !force {
            return HandoffOutcome::NotTriggered;
        }
        let reason = describe(reason, blocker.as_ref());
        self.pause_for_human(executor, progress, &reason, context, blocker)
            .await
    }

    /// Persists the run, notifies observers and suspends until resumed.
    ///
    /// On `Continue` the result status from before the pause is restored.
    /// On `Abandon` it stays `awaiting_human`.
    pub async fn pause_for_human(
        &self,
        executor: &dyn ActionExecutor,
        progress: &mut Progress,
        reason: &str,
        context: Value,
        blocker: Option<Blocker>,
    ) -> HandoffOutcome {
        if !self.config.enabled {
            debug!(reason, "Handoff disabled; not pausing");
            return HandoffOutcome::Skipped;
        }
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(reason, "Handoff already active; ignoring nested request");
            return HandoffOutcome::Skipped;
        }
        let _guard = ActiveGuard(&self.active);

        let screenshot_path = self.capture(executor).await;
        let current_url = match executor.location().await {
            Ok(location) => Some(location.url),
            Err(err) => {
                warn!(error = %err, "Could not read current url for handoff");
                None
            }
        };

        let previous_status = progress.result.status;
        progress
            .result
            .log_step(format!("Human intervention required: {}", reason));
        progress.result.status = ResultStatus::AwaitingHuman;
        progress.result.awaiting_human_decision = Some(json!({
            "reason": reason,
            "blocker": blocker,
            "context": context,
        }));

        let state = HandoffState::capture(progress, reason)
            .with_context(context)
            .with_blocker(blocker.clone())
            .with_url(current_url.clone())
            .with_screenshot(screenshot_path.clone());
        self.store.save(&state).await;

        let notice = PauseNotice {
            reason: reason.to_string(),
            step: progress.checkpoint.step.clone(),
            field: progress.checkpoint.field.clone(),
            sub_step: progress.checkpoint.sub_step.clone(),
            item_index: progress.checkpoint.item_index,
            blocker,
            current_url,
            screenshot_path,
        };
        warn!(
            reason,
            step = ?notice.step,
            sub_step = ?notice.sub_step,
            record = %self.store.location(),
            "Paused for human intervention"
        );
        let _ = self.notices.send(notice.clone());

        let decision = if self.config.wait {
            self.signal.wait_for_resume(&notice).await
        } else {
            info!("Handoff wait disabled; continuing immediately");
            ResumeDecision::Continue
        };

        match decision {
            ResumeDecision::Continue => {
                progress.result.status = previous_status;
                progress.result.awaiting_human_decision = None;
                progress.result.log_step("Human intervention resolved; resuming");
                info!(reason, "Resuming after handoff");
                HandoffOutcome::Resumed
            }
            ResumeDecision::Abandon => {
                progress.result.log_step("Human intervention abandoned item");
                info!(reason, "Operator abandoned the item");
                HandoffOutcome::Abandoned
            }
        }
    }

    /// Waits for loading indicators to clear, then checks for blockers.
    pub async fn wait_for_page_ready(
        &self,
        executor: &dyn ActionExecutor,
        progress: &mut Progress,
        loading_selectors: &[String],
        policy: PollPolicy,
    ) -> HandoffOutcome {
        for selector in loading_selectors {
            let outcome = poll_until(policy, |_| async move {
                let visible = executor
                    .probe(&Probe::ElementVisible(selector.clone()))
                    .await?;
                Ok::<_, ActionError>((!visible.as_bool().unwrap_or(false)).then_some(()))
            })
            .await;
            match outcome {
                Ok(outcome) if !outcome.is_found() => {
                    debug!(selector = %selector, "Loading indicator still visible")
                }
                Err(err) => warn!(error = %err, "Page readiness check failed"),
                _ => {}
            }
        }
        self.handoff_if_blocked(executor, progress, "Page blocked", Value::Null, false)
            .await
    }

    async fn capture(&self, executor: &dyn ActionExecutor) -> Option<PathBuf> {
        let path = self.config.screenshot_dir.join(format!(
            "handoff_{}.png",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        match executor.capture_screenshot(Some(path)).await {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(error = %err, "Handoff screenshot failed; continuing without it");
                None
            }
        }
    }
}
