//! Wiring of a batch run from configuration
//!
//! Kept apart from the CLI so tests can drive the same assembly with a
//! scripted session instead of a browser.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use action_flow::Workflow;
use action_primitives::{ActionExecutor, DefaultActionExecutor};
use batch_runner::{BatchOrchestrator, FormPlan};
use checkpoint_store::{CheckpointStore, FileCheckpointStore};
use formrunner_core_types::BrowserSession;
use human_handoff::{HandoffController, ResumeSignal};
use tokio::fs;
use tracing::info;

use crate::config::AppConfig;
use crate::errors::{FormRunnerError, Result};

pub struct Engine {
    pub orchestrator: BatchOrchestrator,
    pub handoff: Arc<HandoffController>,
}

pub fn open_store(config: &AppConfig) -> Arc<dyn CheckpointStore> {
    Arc::new(FileCheckpointStore::new(config.checkpoint.path.clone()))
}

pub fn assemble(
    config: &AppConfig,
    session: Arc<dyn BrowserSession>,
    signal: Arc<dyn ResumeSignal>,
    plan: FormPlan,
    workflow: Option<Workflow>,
    variables: BTreeMap<String, String>,
) -> Result<Engine> {
    let executor: Arc<dyn ActionExecutor> = Arc::new(DefaultActionExecutor::with_options(
        session,
        config.executor_options(),
    ));
    let handoff = Arc::new(HandoffController::new(
        config.handoff_config(),
        open_store(config),
        signal,
    ));

    let mut orchestrator = BatchOrchestrator::new(
        executor,
        handoff.clone(),
        plan,
        config.batch_options(variables),
    )?;
    if let Some(workflow) = workflow {
        info!(workflow = %workflow.name, steps = workflow.steps.len(), "Workflow attached");
        orchestrator = orchestrator.with_workflow(workflow)?;
    }

    Ok(Engine {
        orchestrator,
        handoff,
    })
}

pub async fn load_workflow(path: &Path) -> Result<Workflow> {
    let raw = read(path).await?;
    Ok(Workflow::from_yaml_str(&raw)?)
}

pub async fn load_plan(path: &Path) -> Result<FormPlan> {
    let raw = read(path).await?;
    Ok(FormPlan::from_yaml_str(&raw)?)
}

async fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .await
        .map_err(|err| FormRunnerError::io(path, err))
}
