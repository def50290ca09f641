//! Scripted in-memory browser session for tests.
//!
//! Actions against selectors that were never registered succeed, so tests
//! only describe the parts of the page they care about. Probes answer from
//! what was registered.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    Blocker, BlockerKind, BrowserSession, PageLocation, Probe, SessionError, SessionId, Target,
};

/// Page change applied after a matching click or navigation.
#[derive(Clone, Debug)]
pub enum PageEffect {
    Navigate { url: String, title: String },
    Show(String),
    Hide(String),
    SetText(String),
    AppendText(String),
    OpenDialog { selector: String, text: String },
    CloseDialogs,
}

#[derive(Default)]
struct PageState {
    location: PageLocation,
    page_text: String,
    elements: HashMap<String, bool>,
    values: HashMap<String, String>,
    dialogs: Vec<(String, String)>,
    captcha: bool,
    busy: bool,
    effects: HashMap<String, Vec<PageEffect>>,
    failures: HashMap<String, (u32, SessionError)>,
    script_results: HashMap<String, Value>,
    log: Vec<String>,
    disconnected: bool,
    screenshot_fails: bool,
}

impl PageState {
    fn gate(&mut self, key: &str) -> Result<(), SessionError> {
        if self.disconnected {
            return Err(SessionError::Disconnected("scripted session closed".into()));
        }
        if let Some((remaining, err)) = self.failures.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(err.clone());
            }
        }
        Ok(())
    }

    fn apply_effects(&mut self, key: &str) {
        let Some(effects) = self.effects.get(key).cloned() else {
            return;
        };
        for effect in effects {
            match effect {
                PageEffect::Navigate { url, title } => {
                    self.location = PageLocation::new(url, title);
                }
                PageEffect::Show(selector) => {
                    self.elements.insert(selector, true);
                }
                PageEffect::Hide(selector) => {
                    self.elements.insert(selector, false);
                }
                PageEffect::SetText(text) => self.page_text = text,
                PageEffect::AppendText(text) => {
                    self.page_text.push(' ');
                    self.page_text.push_str(&text);
                }
                PageEffect::OpenDialog { selector, text } => self.dialogs.push((selector, text)),
                PageEffect::CloseDialogs => self.dialogs.clear(),
            }
        }
    }

    fn answer(&self, probe: &Probe) -> Value {
        match probe {
            Probe::TextVisible(text) => {
                let needle = text.to_lowercase();
                let on_page = self.page_text.to_lowercase().contains(&needle);
                let in_dialog = self
                    .dialogs
                    .iter()
                    .any(|(_, body)| body.to_lowercase().contains(&needle));
                Value::Bool(on_page || in_dialog)
            }
            Probe::ElementVisible(selector) => Value::Bool(
                self.elements.get(selector).copied().unwrap_or(false)
                    || self.dialogs.iter().any(|(sel, _)| sel == selector),
            ),
            Probe::ElementExists(selector) => Value::Bool(
                self.elements.contains_key(selector)
                    || self.dialogs.iter().any(|(sel, _)| sel == selector),
            ),
            Probe::ElementValue(selector) => {
                Value::String(self.values.get(selector).cloned().unwrap_or_default())
            }
            Probe::PageText => Value::String(self.page_text.clone()),
            Probe::PageIdle => Value::Bool(!self.busy),
            Probe::Blockers(rules) => {
                let found = if self.captcha {
                    Some(Blocker::new(BlockerKind::Captcha, "captcha frame present"))
                } else if let Some((_, text)) = self.dialogs.iter().find(|(sel, text)| {
                    rules.dialog_selectors.iter().any(|s| s == sel)
                        && rules.matching_keyword(text).is_some()
                }) {
                    Some(Blocker::new(BlockerKind::Dialog, text))
                } else {
                    rules
                        .matching_marker(&self.location.url)
                        .or_else(|| rules.matching_marker(&self.page_text))
                        .map(|marker| Blocker::new(BlockerKind::Interstitial, marker))
                };
                found
                    .and_then(|blocker| serde_json::to_value(blocker).ok())
                    .unwrap_or(Value::Null)
            }
            Probe::Script(script) => self
                .script_results
                .get(script)
                .cloned()
                .unwrap_or(Value::Null),
        }
    }
}

pub struct ScriptedSession {
    id: SessionId,
    state: Mutex<PageState>,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            state: Mutex::new(PageState::default()),
        }
    }

    pub fn at(url: &str) -> Self {
        let session = Self::new();
        session.set_location(url, "");
        session
    }

    pub fn set_location(&self, url: &str, title: &str) {
        self.state.lock().location = PageLocation::new(url, title);
    }

    pub fn set_page_text(&self, text: &str) {
        self.state.lock().page_text = text.to_string();
    }

    pub fn show(&self, selector: &str) {
        self.state.lock().elements.insert(selector.to_string(), true);
    }

    pub fn hide(&self, selector: &str) {
        self.state.lock().elements.insert(selector.to_string(), false);
    }

    pub fn open_dialog(&self, selector: &str, text: &str) {
        self.state
            .lock()
            .dialogs
            .push((selector.to_string(), text.to_string()));
    }

    pub fn close_dialogs(&self) {
        self.state.lock().dialogs.clear();
    }

    pub fn set_captcha(&self, present: bool) {
        self.state.lock().captcha = present;
    }

    /// Registers effects for an operation key such as `click:#save`,
    /// `click:text=New` or `navigate:https://host/path`.
    /// Page keeps loading until cleared
    pub fn set_busy(&self, busy: bool) {
        self.state.lock().busy = busy;
    }

    pub fn on(&self, key: &str, effects: Vec<PageEffect>) {
        self.state
            .lock()
            .effects
            .entry(key.to_string())
            .or_default()
            .extend(effects);
    }

    /// Makes the next `times` operations with this key fail with `err`.
    pub fn fail_times(&self, key: &str, times: u32, err: SessionError) {
        self.state
            .lock()
            .failures
            .insert(key.to_string(), (times, err));
    }

    pub fn script_result(&self, script: &str, value: Value) {
        self.state
            .lock()
            .script_results
            .insert(script.to_string(), value);
    }

    pub fn disconnect(&self) {
        self.state.lock().disconnected = true;
    }

    pub fn fail_screenshots(&self) {
        self.state.lock().screenshot_fails = true;
    }

    pub fn value_of(&self, selector: &str) -> Option<String> {
        self.state.lock().values.get(selector).cloned()
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    /// Number of logged operations starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    fn id(&self) -> &SessionId {
        &self.id
    }

    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        let key = format!("navigate:{}", url);
        let mut state = self.state.lock();
        state.gate(&key)?;
        state.location = PageLocation::new(url, "");
        state.log.push(key.clone());
        state.apply_effects(&key);
        Ok(())
    }

    async fn click(&self, target: &Target) -> Result<(), SessionError> {
        let key = format!("click:{}", target);
        let mut state = self.state.lock();
        state.gate(&key)?;
        if let Target::Selector(selector) = target {
            if state.elements.get(selector) == Some(&false) {
                return Err(SessionError::NotInteractable(selector.clone()));
            }
        }
        state.log.push(key.clone());
        state.apply_effects(&key);
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<(), SessionError> {
        let key = format!("type:{}", selector);
        let mut state = self.state.lock();
        state.gate(&key)?;
        if state.elements.get(selector) == Some(&false) {
            return Err(SessionError::NotInteractable(selector.to_string()));
        }
        state
            .values
            .entry(selector.to_string())
            .or_default()
            .push_str(text);
        state.log.push(format!("{}={}", key, text));
        Ok(())
    }

    async fn clear(&self, selector: &str) -> Result<(), SessionError> {
        let key = format!("clear:{}", selector);
        let mut state = self.state.lock();
        state.gate(&key)?;
        state.values.insert(selector.to_string(), String::new());
        state.log.push(key);
        Ok(())
    }

    async fn evaluate(&self, probe: &Probe) -> Result<Value, SessionError> {
        let mut state = self.state.lock();
        state.gate("evaluate")?;
        Ok(state.answer(probe))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, SessionError> {
        let mut state = self.state.lock();
        state.gate("screenshot")?;
        if state.screenshot_fails {
            return Err(SessionError::Protocol("screenshot capture failed".into()));
        }
        state.log.push("screenshot".into());
        Ok(b"\x89PNG scripted".to_vec())
    }

    async fn current_location(&self) -> Result<PageLocation, SessionError> {
        let mut state = self.state.lock();
        state.gate("location")?;
        Ok(state.location.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlockerRules;

    #[tokio::test]
    async fn click_effects_move_the_page() {
        let session = ScriptedSession::at("https://erp.test/odoo");
        session.on(
            "click:text=Invoices",
            vec![PageEffect::Navigate {
                url: "https://erp.test/odoo/accounting/customer-invoices".into(),
                title: "Invoices".into(),
            }],
        );
        session.click(&Target::text("Invoices")).await.unwrap();
        let loc = session.current_location().await.unwrap();
        assert!(loc.url.ends_with("customer-invoices"));
    }

    #[tokio::test]
    async fn scripted_failures_run_out() {
        let session = ScriptedSession::new();
        session.fail_times("type:#qty", 1, SessionError::NotFound("#qty".into()));
        assert!(session.type_text("#qty", "3").await.is_err());
        session.type_text("#qty", "3").await.unwrap();
        assert_eq!(session.value_of("#qty").as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn dialog_with_keyword_is_a_blocker() {
        let session = ScriptedSession::new();
        session.open_dialog(".modal", "Security check: please verify");
        let value = session
            .evaluate(&Probe::Blockers(BlockerRules::default()))
            .await
            .unwrap();
        assert_eq!(value["type"], "dialog");
    }

    #[test]
    fn disconnected_session_rejects_everything() {
        let session = ScriptedSession::new();
        session.disconnect();
        let err = tokio_test::block_on(session.navigate("https://x.test")).unwrap_err();
        assert!(matches!(err, SessionError::Disconnected(_)));
    }
}
