use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use formrunner_core_types::{
    BrowserSession, PageLocation, Probe, SessionError, SessionId, Target,
};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::scripts::{clear_script, click_text_script, probe_script};

/// One browser tab driven over the DevTools protocol.
pub struct CdpSession {
    id: SessionId,
    browser: Mutex<Browser>,
    page: Page,
    alive: Arc<AtomicBool>,
    handler: JoinHandle<()>,
    deadline: Duration,
}

impl CdpSession {
    /// Connects to `config.websocket_url`, or launches a local browser.
    pub async fn connect(config: &CdpConfig) -> Result<Self, AdapterError> {
        let (browser, mut handler) = match &config.websocket_url {
            Some(url) => {
                info!(url = %url, "Connecting to running browser");
                Browser::connect(url.clone()).await?
            }
            None => {
                let mut builder = BrowserConfig::builder();
                if !config.headless {
                    builder = builder.with_head();
                }
                if let Some(path) = &config.executable {
                    builder = builder.chrome_executable(path);
                }
                if let Some(dir) = &config.user_data_dir {
                    builder = builder.user_data_dir(dir);
                }
                let browser_config = builder.build().map_err(|err| {
                    AdapterError::new(AdapterErrorKind::Launch).with_hint(err)
                })?;
                info!(headless = config.headless, "Launching browser");
                Browser::launch(browser_config).await?
            }
        };

        let alive = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&alive);
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    warn!(error = %err, "DevTools handler error");
                    break;
                }
            }
            flag.store(false, Ordering::SeqCst);
            debug!("DevTools handler stopped");
        });

        let page = match browser.pages().await?.into_iter().next() {
            Some(page) => page,
            None => browser.new_page("about:blank").await?,
        };

        Ok(Self {
            id: SessionId::new(),
            browser: Mutex::new(browser),
            page,
            alive,
            handler,
            deadline: Duration::from_millis(config.default_deadline_ms),
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Closes the browser and stops the protocol handler.
    pub async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(err) = browser.close().await {
            debug!(error = %err, "Browser close failed");
        }
        self.handler.abort();
        self.alive.store(false, Ordering::SeqCst);
    }

    async fn guarded<T, F>(&self, what: &str, fut: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, AdapterError>>,
    {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(SessionError::Disconnected("devtools connection closed".into()));
        }
        match timeout(self.deadline, fut).await {
            Ok(result) => result.map_err(SessionError::from),
            Err(_) => Err(AdapterError::new(AdapterErrorKind::Timeout)
                .with_hint(what.to_string())
                .into()),
        }
    }

    async fn run_script(&self, script: String) -> Result<Value, AdapterError> {
        let result = self.page.evaluate(script).await?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl BrowserSession for CdpSession {
    fn id(&self) -> &SessionId {
        &self.id
    }

    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        self.guarded("navigate", async {
            self.page.goto(url).await?;
            Ok::<_, AdapterError>(())
        })
        .await
    }

    async fn click(&self, target: &Target) -> Result<(), SessionError> {
        self.guarded("click", async {
            match target {
                Target::Selector(selector) => {
                    let element = self.page.find_element(selector.as_str()).await.map_err(|err| {
                        AdapterError::from(err).with_hint(format!("selector {}", selector))
                    })?;
                    element.scroll_into_view().await?;
                    element.click().await?;
                }
                Target::Text(text) => {
                    let clicked = self.run_script(click_text_script(text)).await?;
                    if clicked != Value::Bool(true) {
                        return Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                            .with_hint(format!("text {}", text)));
                    }
                }
            }
            Ok::<_, AdapterError>(())
        })
        .await
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), SessionError> {
        self.guarded("type", async {
            let element = self.page.find_element(selector).await.map_err(|err| {
                AdapterError::from(err).with_hint(format!("selector {}", selector))
            })?;
            element.click().await?;
            element.type_str(text).await?;
            Ok::<_, AdapterError>(())
        })
        .await
    }

    async fn clear(&self, selector: &str) -> Result<(), SessionError> {
        self.guarded("clear", async {
            let cleared = self.run_script(clear_script(selector)).await?;
            if cleared != Value::Bool(true) {
                return Err(AdapterError::new(AdapterErrorKind::TargetNotFound)
                    .with_hint(format!("selector {}", selector)));
            }
            Ok::<_, AdapterError>(())
        })
        .await
    }

    async fn evaluate(&self, probe: &Probe) -> Result<Value, SessionError> {
        self.guarded("evaluate", self.run_script(probe_script(probe)))
            .await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, SessionError> {
        self.guarded("screenshot", async {
            let bytes = self
                .page
                .screenshot(ScreenshotParams::builder().build())
                .await?;
            Ok::<_, AdapterError>(bytes)
        })
        .await
    }

    async fn current_location(&self) -> Result<PageLocation, SessionError> {
        self.guarded("location", async {
            let url = self.page.url().await?.unwrap_or_default();
            let title = self.page.get_title().await?.unwrap_or_default();
            Ok::<_, AdapterError>(PageLocation::new(url, title))
        })
        .await
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
