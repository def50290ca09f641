//! Action primitives implementation
//!
//! Six primitives, one file each:
//! 1. navigate - load a URL
//! 2. click - click a selector or visible text
//! 3. type_text - clear then type into an input
//! 4. wait - poll a condition, found or timed out
//! 5. probe - evaluate a read-only page question
//! 6. screenshot - capture the viewport to disk

mod click;
mod navigate;
mod probe;
mod screenshot;
mod type_text;
mod wait;

pub use click::*;
pub use navigate::*;
pub use probe::*;
pub use screenshot::*;
pub use type_text::*;
pub use wait::*;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use formrunner_core_types::{ActionId, BrowserSession, PageLocation, Probe};
use serde_json::Value;
use tracing::warn;

use crate::{
    errors::ActionError,
    types::{Action, ActionOutput, ActionReport, ScreenshotParams},
};

/// Executes one primitive action against the owned session.
///
/// Side effects are not idempotent; callers that retry must re-establish
/// state first.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &Action) -> Result<ActionReport, ActionError>;

    async fn location(&self) -> Result<PageLocation, ActionError>;

    /// Evaluate a probe and hand back the raw answer
    async fn probe(&self, probe: &Probe) -> Result<Value, ActionError> {
        let report = self.execute(&Action::probe(probe.clone())).await?;
        Ok(report.probe_value().cloned().unwrap_or(Value::Null))
    }

    /// Capture a screenshot, returning the written path
    async fn capture_screenshot(&self, path: Option<PathBuf>) -> Result<PathBuf, ActionError> {
        let report = self
            .execute(&Action::Screenshot(ScreenshotParams { path }))
            .await?;
        match report.output {
            ActionOutput::Screenshot { path, .. } => Ok(path),
            other => Err(ActionError::Internal(format!(
                "screenshot produced unexpected output: {:?}",
                other
            ))),
        }
    }
}

/// Tunables shared by all primitives
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub default_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub screenshot_dir: PathBuf,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            default_timeout_ms: 10_000,
            poll_interval_ms: 500,
            screenshot_dir: PathBuf::from("screenshots"),
        }
    }
}

/// Default implementation over a [`BrowserSession`]
pub struct DefaultActionExecutor {
    session: Arc<dyn BrowserSession>,
    options: ExecutorOptions,
}

impl DefaultActionExecutor {
    pub fn new(session: Arc<dyn BrowserSession>) -> Self {
        Self::with_options(session, ExecutorOptions::default())
    }

    pub fn with_options(session: Arc<dyn BrowserSession>, options: ExecutorOptions) -> Self {
        Self { session, options }
    }

    pub fn session(&self) -> &Arc<dyn BrowserSession> {
        &self.session
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Best-effort location read used to annotate reports
    pub(crate) async fn observed_location(&self) -> Option<PageLocation> {
        match self.session.current_location().await {
            Ok(location) => Some(location),
            Err(err) => {
                warn!("failed to read location after action: {}", err);
                None
            }
        }
    }
}

#[async_trait]
impl ActionExecutor for DefaultActionExecutor {
    async fn execute(&self, action: &Action) -> Result<ActionReport, ActionError> {
        let action_id = ActionId::new();
        match action {
            Action::Navigate(params) => execute_navigate(self, &action_id, params).await,
            Action::Click(params) => execute_click(self, &action_id, params).await,
            Action::Type(params) => execute_type_text(self, &action_id, params).await,
            Action::Wait(params) => execute_wait(self, &action_id, params).await,
            Action::Probe(params) => execute_probe(self, &action_id, params).await,
            Action::Screenshot(params) => execute_screenshot(self, &action_id, params).await,
        }
    }

    async fn location(&self) -> Result<PageLocation, ActionError> {
        Ok(self.session.current_location().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formrunner_core_types::testing::ScriptedSession;
    use formrunner_core_types::{SessionError, Target};

    fn executor(session: Arc<ScriptedSession>) -> DefaultActionExecutor {
        DefaultActionExecutor::with_options(
            session,
            ExecutorOptions {
                default_timeout_ms: 50,
                poll_interval_ms: 10,
                screenshot_dir: std::env::temp_dir(),
            },
        )
    }

    #[tokio::test]
    async fn dispatches_every_kind() {
        let session = Arc::new(ScriptedSession::at("https://erp.test/web/login"));
        let exec = executor(session.clone());

        exec.execute(&Action::navigate("https://erp.test/odoo"))
            .await
            .unwrap();
        exec.execute(&Action::click(Target::text("Invoicing")))
            .await
            .unwrap();
        exec.execute(&Action::type_text("#partner", "Acme"))
            .await
            .unwrap();

        assert_eq!(
            session.log(),
            vec![
                "navigate:https://erp.test/odoo".to_string(),
                "click:text=Invoicing".to_string(),
                "clear:#partner".to_string(),
                "type:#partner=Acme".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn probe_helper_returns_raw_value() {
        let session = Arc::new(ScriptedSession::new());
        session.set_page_text("Customer Invoices");
        let exec = executor(session);
        let value = exec
            .probe(&Probe::TextVisible("customer invoices".into()))
            .await
            .unwrap();
        assert_eq!(value, Value::Bool(true));
    }

    #[tokio::test]
    async fn session_errors_become_action_errors() {
        let session = Arc::new(ScriptedSession::new());
        session.fail_times("click:#save", 1, SessionError::NotFound("#save".into()));
        let exec = executor(session);
        let err = exec
            .execute(&Action::click(Target::selector("#save")))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::TargetNotFound(_)));
    }
}
