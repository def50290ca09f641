use std::fmt;

use serde::{Deserialize, Serialize};

/// Longest blocker detail kept in a handoff record.
pub const BLOCKER_DETAIL_LIMIT: usize = 200;

/// Something a click can land on.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// CSS selector
    Selector(String),
    /// Visible text of a button, link or menu entry
    Text(String),
}

impl Target {
    pub fn selector(value: impl Into<String>) -> Self {
        Target::Selector(value.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Target::Text(value.into())
    }

    /// Inverse of the `Display` form: `text=Next` is a text target,
    /// anything else a selector.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().strip_prefix("text=") {
            Some(text) => Target::text(text),
            None => Target::selector(raw.trim()),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Selector(selector) => f.write_str(selector),
            Target::Text(text) => write!(f, "text={}", text),
        }
    }
}

/// Read-only question asked of the page.
///
/// Each variant has a fixed answer shape: the boolean probes answer with a
/// JSON bool, `ElementValue` and `PageText` with a string, `Blockers` with
/// either `null` or a serialized [`Blocker`], `Script` with whatever the
/// script returns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Probe {
    TextVisible(String),
    ElementVisible(String),
    ElementExists(String),
    ElementValue(String),
    PageText,
    /// Document loaded and no pending network activity
    PageIdle,
    Blockers(BlockerRules),
    Script(String),
}

/// Rules used to recognise a blocker on the current page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockerRules {
    pub dialog_selectors: Vec<String>,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub interstitial_markers: Vec<String>,
}

impl Default for BlockerRules {
    fn default() -> Self {
        Self {
            dialog_selectors: [
                "[role=\"dialog\"]",
                ".modal",
                ".o_dialog",
                ".o_notification",
                ".alert",
                ".o_dialog_container",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            keywords: [
                "are you human",
                "verify",
                "robot",
                "captcha",
                "access denied",
                "unusual traffic",
                "security check",
                "verification",
                "please verify",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            interstitial_markers: [
                "/cdn-cgi/challenge",
                "checking your browser",
                "just a moment...",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl BlockerRules {
    /// First keyword contained in `text`, compared case-insensitively.
    pub fn matching_keyword(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.keywords
            .iter()
            .find(|kw| lowered.contains(&kw.to_lowercase()))
            .map(String::as_str)
    }

    pub fn matching_marker(&self, haystack: &str) -> Option<&str> {
        let lowered = haystack.to_lowercase();
        self.interstitial_markers
            .iter()
            .find(|marker| lowered.contains(&marker.to_lowercase()))
            .map(String::as_str)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerKind {
    Captcha,
    Dialog,
    Interstitial,
}

/// An obstacle automation cannot resolve by itself.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Blocker {
    #[serde(rename = "type")]
    pub kind: BlockerKind,
    pub detail: String,
}

impl Blocker {
    pub fn new(kind: BlockerKind, detail: impl AsRef<str>) -> Self {
        Self {
            kind,
            detail: detail
                .as_ref()
                .trim()
                .chars()
                .take(BLOCKER_DETAIL_LIMIT)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_uses_externally_tagged_form() {
        let target: Target = serde_json::from_str(r#"{"text":"New"}"#).unwrap();
        assert_eq!(target, Target::text("New"));
        assert_eq!(target.to_string(), "text=New");
    }

    #[test]
    fn parse_reads_display_form() {
        assert_eq!(Target::parse("text=Next page"), Target::text("Next page"));
        assert_eq!(Target::parse(" .o_pager_next "), Target::selector(".o_pager_next"));
    }

    #[test]
    fn blocker_detail_is_truncated() {
        let long = "x".repeat(500);
        let blocker = Blocker::new(BlockerKind::Dialog, &long);
        assert_eq!(blocker.detail.chars().count(), BLOCKER_DETAIL_LIMIT);
    }

    #[test]
    fn keyword_match_ignores_case() {
        let rules = BlockerRules::default();
        assert_eq!(
            rules.matching_keyword("Please VERIFY you are not a robot"),
            Some("verify")
        );
        assert_eq!(rules.matching_keyword("Invoice saved"), None);
    }

    #[test]
    fn blocker_serializes_kind_as_type() {
        let value = serde_json::to_value(Blocker::new(BlockerKind::Captcha, "recaptcha")).unwrap();
        assert_eq!(value["type"], "captcha");
    }
}
