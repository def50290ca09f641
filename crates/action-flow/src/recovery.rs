//! Smart recovery routing
//!
//! Position is re-derived from what the page shows, never from elapsed
//! time or step index. The table is scanned top to bottom; the first
//! satisfied entry wins and the terminal `default` guarantees a match.

use std::collections::BTreeMap;

use action_primitives::{ActionError, ActionExecutor};
use formrunner_core_types::{PageLocation, Probe};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::FlowError;

/// Observable-signal condition shared by recovery entries and `check`
/// transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "condition", content = "value", rename_all = "snake_case")]
pub enum Condition {
    UrlContains(String),
    UrlNotContains(String),
    TitleContains(String),
    TextVisible(String),
    ElementExists(String),
    ElementVisible(String),
    Default,
}

impl Condition {
    pub fn holds(&self, observation: &Observation) -> bool {
        match self {
            Condition::UrlContains(fragment) => observation.location.url.contains(fragment.as_str()),
            Condition::UrlNotContains(fragment) => {
                !observation.location.url.contains(fragment.as_str())
            }
            Condition::TitleContains(fragment) => observation
                .location
                .title
                .to_lowercase()
                .contains(&fragment.to_lowercase()),
            Condition::TextVisible(text) => observation.text_visible(text),
            Condition::ElementExists(selector) => observation.element_exists(selector),
            Condition::ElementVisible(selector) => observation.element_visible(selector),
            Condition::Default => true,
        }
    }

    fn needs_probe(&self) -> Option<Probe> {
        match self {
            Condition::TextVisible(text) => Some(Probe::TextVisible(text.clone())),
            Condition::ElementExists(selector) => Some(Probe::ElementExists(selector.clone())),
            Condition::ElementVisible(selector) => Some(Probe::ElementVisible(selector.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryCheck {
    pub when: Condition,
    pub target_step: String,
}

impl RecoveryCheck {
    pub fn new(when: Condition, target_step: impl Into<String>) -> Self {
        Self {
            when,
            target_step: target_step.into(),
        }
    }
}

/// Snapshot of the signals routing decisions are made from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    pub location: PageLocation,
    texts: BTreeMap<String, bool>,
    elements: BTreeMap<String, bool>,
    visible: BTreeMap<String, bool>,
}

impl Observation {
    pub fn at(location: PageLocation) -> Self {
        Self {
            location,
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>, visible: bool) -> Self {
        self.texts.insert(text.into(), visible);
        self
    }

    pub fn with_element(mut self, selector: impl Into<String>, exists: bool) -> Self {
        self.elements.insert(selector.into(), exists);
        self
    }

    /// Unprobed markers count as absent.
    pub fn text_visible(&self, text: &str) -> bool {
        self.texts.get(text).copied().unwrap_or(false)
    }

    pub fn element_exists(&self, selector: &str) -> bool {
        self.elements.get(selector).copied().unwrap_or(false)
    }

    pub fn element_visible(&self, selector: &str) -> bool {
        self.visible.get(selector).copied().unwrap_or(false)
    }

    /// Reads the location and probes every marker `conditions` mention.
    ///
    /// Probe failures count as "not visible"; only a lost session is an
    /// error.
    pub async fn gather<'a, I>(
        executor: &dyn ActionExecutor,
        conditions: I,
    ) -> Result<Self, ActionError>
    where
        I: IntoIterator<Item = &'a Condition>,
    {
        let location = match executor.location().await {
            Ok(location) => location,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                debug!(error = %err, "location unavailable; routing on empty url");
                PageLocation::default()
            }
        };
        let mut observation = Observation::at(location);

        let mut wanted: Vec<&Condition> = Vec::new();
        for condition in conditions {
            if condition.needs_probe().is_some() && !wanted.contains(&condition) {
                wanted.push(condition);
            }
        }

        for condition in wanted {
            let Some(probe) = condition.needs_probe() else {
                continue;
            };
            let answer = match executor.probe(&probe).await {
                Ok(value) => value.as_bool().unwrap_or(false),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!(error = %err, ?probe, "probe failed; treating as absent");
                    false
                }
            };
            match condition {
                Condition::TextVisible(text) => {
                    observation.texts.insert(text.clone(), answer);
                }
                Condition::ElementExists(selector) => {
                    observation.elements.insert(selector.clone(), answer);
                }
                Condition::ElementVisible(selector) => {
                    observation.visible.insert(selector.clone(), answer);
                }
                _ => {}
            }
        }
        Ok(observation)
    }
}

/// Ordered recovery checks with a guaranteed fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryTable {
    checks: Vec<RecoveryCheck>,
    fallback: String,
}

impl RecoveryTable {
    /// Fails unless the last entry is `default`.
    pub fn new(mut checks: Vec<RecoveryCheck>) -> Result<Self, FlowError> {
        match checks.pop() {
            Some(RecoveryCheck {
                when: Condition::Default,
                target_step,
            }) => Ok(Self {
                checks,
                fallback: target_step,
            }),
            _ => Err(FlowError::InvalidWorkflow(
                "recovery checks must end with a default entry".to_string(),
            )),
        }
    }

    /// Table whose only entry sends everything to `step`.
    pub fn restart_at(step: impl Into<String>) -> Self {
        Self {
            checks: Vec::new(),
            fallback: step.into(),
        }
    }

    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.checks.iter().map(|check| &check.when)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.checks
            .iter()
            .map(|check| check.target_step.as_str())
            .chain(std::iter::once(self.fallback.as_str()))
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Target step for `observation`; always answers.
    pub fn route(&self, observation: &Observation) -> &str {
        let target = self
            .checks
            .iter()
            .find(|check| check.when.holds(observation))
            .map(|check| check.target_step.as_str())
            .unwrap_or(self.fallback.as_str());
        info!(url = %observation.location.url, target, "Recovery route selected");
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice_table() -> RecoveryTable {
        RecoveryTable::new(vec![
            RecoveryCheck::new(
                Condition::UrlContains("customer-invoices/new".into()),
                "verify_invoice_form_loaded",
            ),
            RecoveryCheck::new(
                Condition::UrlContains("customer-invoices".into()),
                "navigate_to_new_invoice",
            ),
            RecoveryCheck::new(
                Condition::UrlContains("/odoo/accounting".into()),
                "wait_for_invoicing_page",
            ),
            RecoveryCheck::new(Condition::UrlContains("/odoo".into()), "wait_for_dashboard"),
            RecoveryCheck::new(Condition::UrlContains("/web/login".into()), "perform_login"),
            RecoveryCheck::new(Condition::Default, "navigate_to_odoo"),
        ])
        .unwrap()
    }

    fn at(url: &str) -> Observation {
        Observation::at(PageLocation::new(url, ""))
    }

    #[test]
    fn first_match_wins() {
        let table = invoice_table();
        assert_eq!(
            table.route(&at("https://erp.test/odoo/accounting/customer-invoices/new")),
            "verify_invoice_form_loaded"
        );
        assert_eq!(
            table.route(&at("https://erp.test/odoo/accounting/customer-invoices")),
            "navigate_to_new_invoice"
        );
        assert_eq!(table.route(&at("https://erp.test/odoo")), "wait_for_dashboard");
    }

    #[test]
    fn every_signal_gets_a_target() {
        let table = invoice_table();
        let urls = [
            "",
            "about:blank",
            "https://erp.test/web/login?redirect=x",
            "https://elsewhere.test/",
            "customer-invoices",
            "\u{1F600}",
        ];
        for url in urls {
            let target = table.route(&at(url));
            assert!(table.targets().any(|t| t == target));
        }
        assert_eq!(table.route(&at("https://elsewhere.test/")), "navigate_to_odoo");
    }

    #[test]
    fn table_without_terminal_default_is_rejected() {
        let missing = RecoveryTable::new(vec![RecoveryCheck::new(
            Condition::UrlContains("/odoo".into()),
            "a",
        )]);
        assert!(missing.is_err());

        let misplaced = RecoveryTable::new(vec![
            RecoveryCheck::new(Condition::Default, "a"),
            RecoveryCheck::new(Condition::UrlContains("/odoo".into()), "b"),
        ]);
        assert!(misplaced.is_err());
        assert!(RecoveryTable::new(Vec::new()).is_err());
    }

    #[test]
    fn text_conditions_use_probed_markers() {
        let table = RecoveryTable::new(vec![
            RecoveryCheck::new(Condition::TextVisible("Draft".into()), "fill_lines"),
            RecoveryCheck::new(Condition::Default, "start"),
        ])
        .unwrap();
        assert_eq!(table.route(&at("x").with_text("Draft", true)), "fill_lines");
        assert_eq!(table.route(&at("x").with_text("Draft", false)), "start");
        assert_eq!(table.route(&at("x")), "start");
    }

    #[test]
    fn not_contains_and_title() {
        let obs = Observation::at(PageLocation::new("https://erp.test/odoo/accounting", "Invoicing"));
        assert!(Condition::UrlNotContains("customer-invoices".into()).holds(&obs));
        assert!(Condition::TitleContains("invoicing".into()).holds(&obs));
        assert!(!Condition::ElementExists(".o_form_view".into()).holds(&obs));
    }

    #[test]
    fn condition_yaml_shape() {
        let cond: Condition = serde_yaml::from_str("{ condition: default }").unwrap();
        assert_eq!(cond, Condition::Default);
        let cond: Condition =
            serde_yaml::from_str("{ condition: url_contains, value: /odoo }").unwrap();
        assert_eq!(cond, Condition::UrlContains("/odoo".into()));
    }
}
