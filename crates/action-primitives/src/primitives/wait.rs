//! Wait primitive - poll a page condition until found or timed out

use std::time::{Duration, Instant};

use chrono::Utc;
use formrunner_core_types::{ActionId, Probe};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::{
    errors::ActionError,
    primitives::DefaultActionExecutor,
    types::{ActionOutput, ActionReport, WaitCondition, WaitParams},
    waiting::{poll_until, PollOutcome, PollPolicy},
};

/// Execute wait primitive
///
/// A timeout is not an error: the report carries `found == false`, and
/// `ok == false` only when the wait was marked required.
pub async fn execute_wait(
    executor: &DefaultActionExecutor,
    action_id: &ActionId,
    params: &WaitParams,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %action_id,
        condition = ?params.condition,
        "Executing wait primitive"
    );

    let (found, attempts) = match &params.condition {
        WaitCondition::Delay(ms) => {
            sleep(Duration::from_millis(*ms)).await;
            (true, 1)
        }
        condition => {
            let options = executor.options();
            let policy = PollPolicy::from_timeout(
                params.timeout_ms.unwrap_or(options.default_timeout_ms),
                params.poll_interval_ms.unwrap_or(options.poll_interval_ms),
            );
            match poll_until(policy, |attempt| check_condition(executor, condition, attempt)).await? {
                PollOutcome::Found(attempt) => (true, attempt + 1),
                PollOutcome::TimedOut { attempts } => (false, attempts),
            }
        }
    };

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    debug!(action_id = %action_id, found, attempts, latency_ms, "Wait finished");

    Ok(ActionReport::success(started_at, latency_ms)
        .with_ok(found || !params.required)
        .with_output(ActionOutput::Wait { found, attempts }))
}

async fn check_condition(
    executor: &DefaultActionExecutor,
    condition: &WaitCondition,
    attempt: u32,
) -> Result<Option<u32>, ActionError> {
    let session = executor.session();
    let satisfied = match condition {
        WaitCondition::ElementVisible(selector) => {
            is_true(&session.evaluate(&Probe::ElementVisible(selector.clone())).await?)
        }
        WaitCondition::ElementHidden(selector) => {
            !is_true(&session.evaluate(&Probe::ElementVisible(selector.clone())).await?)
        }
        WaitCondition::TextVisible(text) => {
            is_true(&session.evaluate(&Probe::TextVisible(text.clone())).await?)
        }
        WaitCondition::UrlContains(fragment) => session
            .current_location()
            .await?
            .url
            .contains(fragment.as_str()),
        WaitCondition::PageIdle => is_true(&session.evaluate(&Probe::PageIdle).await?),
        WaitCondition::Delay(_) => true,
    };
    Ok(satisfied.then_some(attempt))
}

fn is_true(value: &Value) -> bool {
    value.as_bool().unwrap_or(false)
}
