//! Click primitive - click a selector or visible text

use std::time::{Duration, Instant};

use chrono::Utc;
use formrunner_core_types::ActionId;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::{
    errors::ActionError,
    primitives::DefaultActionExecutor,
    types::{ActionReport, ClickParams},
};

/// Execute click primitive
pub async fn execute_click(
    executor: &DefaultActionExecutor,
    action_id: &ActionId,
    params: &ClickParams,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(action_id = %action_id, target = %params.target, "Executing click primitive");

    executor.session().click(&params.target).await?;

    if params.settle_ms > 0 {
        debug!(settle_ms = params.settle_ms, "Letting the page settle after click");
        sleep(Duration::from_millis(params.settle_ms)).await;
    }

    let location = executor.observed_location().await;
    let latency_ms = start_instant.elapsed().as_millis() as u64;
    debug!(action_id = %action_id, latency_ms, "Click completed");

    Ok(ActionReport::success(started_at, latency_ms).with_location(location))
}
