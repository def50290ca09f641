//! Screenshot primitive - capture the viewport to a file

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use formrunner_core_types::ActionId;
use tracing::info;

use crate::{
    errors::ActionError,
    primitives::DefaultActionExecutor,
    types::{ActionOutput, ActionReport, ScreenshotParams},
};

pub async fn execute_screenshot(
    executor: &DefaultActionExecutor,
    action_id: &ActionId,
    params: &ScreenshotParams,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    let path = match &params.path {
        Some(path) => path.clone(),
        None => default_path(&executor.options().screenshot_dir),
    };
    info!(action_id = %action_id, path = %path.display(), "Executing screenshot primitive");

    let bytes = executor.session().screenshot().await?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| ActionError::Io(format!("{}: {}", parent.display(), err)))?;
    }
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|err| ActionError::Io(format!("{}: {}", path.display(), err)))?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    Ok(
        ActionReport::success(started_at, latency_ms).with_output(ActionOutput::Screenshot {
            path,
            bytes: bytes.len(),
        }),
    )
}

fn default_path(dir: &Path) -> PathBuf {
    dir.join(format!("screenshot_{}.png", Utc::now().format("%Y%m%d_%H%M%S_%3f")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{ActionExecutor, ExecutorOptions};
    use formrunner_core_types::testing::ScriptedSession;
    use std::sync::Arc;

    #[tokio::test]
    async fn writes_into_configured_directory() {
        let dir = tempfile::tempdir().unwrap();
        let executor = DefaultActionExecutor::with_options(
            Arc::new(ScriptedSession::new()),
            ExecutorOptions {
                screenshot_dir: dir.path().join("shots"),
                ..ExecutorOptions::default()
            },
        );
        let path = executor.capture_screenshot(None).await.unwrap();
        assert!(path.starts_with(dir.path().join("shots")));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn capture_failure_is_reported() {
        let session = Arc::new(ScriptedSession::new());
        session.fail_screenshots();
        let executor = DefaultActionExecutor::new(session);
        let err = executor
            .capture_screenshot(Some(std::env::temp_dir().join("never.png")))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Protocol(_)));
    }
}
