//! Probe primitive - ask the page a read-only question

use std::time::Instant;

use chrono::Utc;
use formrunner_core_types::ActionId;
use tracing::debug;

use crate::{
    errors::ActionError,
    primitives::DefaultActionExecutor,
    types::{ActionOutput, ActionReport, ProbeParams},
};

pub async fn execute_probe(
    executor: &DefaultActionExecutor,
    action_id: &ActionId,
    params: &ProbeParams,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    debug!(action_id = %action_id, probe = ?params.probe, "Executing probe primitive");

    let value = executor.session().evaluate(&params.probe).await?;
    let latency_ms = start_instant.elapsed().as_millis() as u64;

    Ok(ActionReport::success(started_at, latency_ms).with_output(ActionOutput::Probe { value }))
}
