//! Type text primitive - clear an input then type into it

use std::time::Instant;

use chrono::Utc;
use formrunner_core_types::ActionId;
use tracing::{debug, info};

use crate::{
    errors::ActionError,
    primitives::DefaultActionExecutor,
    types::{ActionReport, TypeParams},
};

/// Execute type primitive
///
/// Typing appends to whatever the input holds, so `clear` defaults to true
/// and a retried type does not double the text.
pub async fn execute_type_text(
    executor: &DefaultActionExecutor,
    action_id: &ActionId,
    params: &TypeParams,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %action_id,
        selector = %params.selector,
        text_len = params.text.len(),
        "Executing type primitive"
    );

    if params.selector.trim().is_empty() {
        return Err(ActionError::InvalidParams(
            "type requires a selector".to_string(),
        ));
    }

    if params.clear {
        debug!(selector = %params.selector, "Clearing input before typing");
        executor.session().clear(&params.selector).await?;
    }
    executor
        .session()
        .type_text(&params.selector, &params.text)
        .await?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    Ok(ActionReport::success(started_at, latency_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use formrunner_core_types::testing::ScriptedSession;
    use std::sync::Arc;

    #[tokio::test]
    async fn retyping_after_clear_does_not_duplicate() {
        let session = Arc::new(ScriptedSession::new());
        let executor = DefaultActionExecutor::new(session.clone());
        let params = TypeParams {
            selector: "#qty".into(),
            text: "4".into(),
            clear: true,
        };
        execute_type_text(&executor, &ActionId::new(), &params)
            .await
            .unwrap();
        execute_type_text(&executor, &ActionId::new(), &params)
            .await
            .unwrap();
        assert_eq!(session.value_of("#qty").as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn empty_selector_is_rejected() {
        let executor = DefaultActionExecutor::new(Arc::new(ScriptedSession::new()));
        let params = TypeParams {
            selector: " ".into(),
            text: "x".into(),
            clear: false,
        };
        let err = execute_type_text(&executor, &ActionId::new(), &params)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams(_)));
    }
}
