//! Navigate primitive - load a URL in the current tab

use std::time::Instant;

use chrono::Utc;
use formrunner_core_types::ActionId;
use tracing::{debug, info};

use crate::{
    errors::ActionError,
    primitives::DefaultActionExecutor,
    types::{ActionReport, NavigateParams},
};

/// Execute navigate primitive
pub async fn execute_navigate(
    executor: &DefaultActionExecutor,
    action_id: &ActionId,
    params: &NavigateParams,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(action_id = %action_id, url = %params.url, "Executing navigate primitive");

    validate_url(&params.url)?;

    debug!("Issuing navigation");
    executor.session().navigate(&params.url).await?;

    let location = executor.observed_location().await;
    let latency_ms = start_instant.elapsed().as_millis() as u64;

    info!(
        action_id = %action_id,
        latency_ms,
        url_after = ?location.as_ref().map(|l| l.url.as_str()),
        "Navigate completed"
    );

    Ok(ActionReport::success(started_at, latency_ms).with_location(location))
}

fn validate_url(url: &str) -> Result<(), ActionError> {
    if url.is_empty() {
        return Err(ActionError::InvalidParams("URL cannot be empty".to_string()));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") && !url.starts_with("file://") {
        return Err(ActionError::InvalidParams(format!(
            "Invalid URL scheme: {}",
            url
        )));
    }
    Ok(())
}
