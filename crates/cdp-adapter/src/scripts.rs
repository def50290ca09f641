//! Page-side JavaScript for probes and DOM helpers

use formrunner_core_types::{BlockerRules, Probe};
use serde_json::Value;

const VISIBLE_FN: &str = "const visible = (el) => !!el \
    && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length) \
    && getComputedStyle(el).visibility !== 'hidden';";

fn literal(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

pub(crate) fn probe_script(probe: &Probe) -> String {
    match probe {
        Probe::TextVisible(text) => format!(
            "(() => {{ const needle = {}.toLowerCase(); \
             return !!document.body && document.body.innerText.toLowerCase().includes(needle); }})()",
            literal(text)
        ),
        Probe::ElementVisible(selector) => format!(
            "(() => {{ {} return Array.from(document.querySelectorAll({})).some(visible); }})()",
            VISIBLE_FN,
            literal(selector)
        ),
        Probe::ElementExists(selector) => {
            format!("document.querySelector({}) !== null", literal(selector))
        }
        Probe::ElementValue(selector) => format!(
            "(() => {{ const el = document.querySelector({}); \
             return el ? (el.value ?? el.innerText ?? '') : ''; }})()",
            literal(selector)
        ),
        Probe::PageText => "document.body ? document.body.innerText : ''".to_string(),
        Probe::PageIdle => "document.readyState === 'complete'".to_string(),
        Probe::Blockers(rules) => blockers_script(rules),
        Probe::Script(source) => source.clone(),
    }
}

fn blockers_script(rules: &BlockerRules) -> String {
    let rules = serde_json::to_value(rules)
        .map(|value| value.to_string())
        .unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"(() => {{
  {visible}
  const rules = {rules};
  const clip = (text) => String(text).trim().slice(0, 200);
  const frames = Array.from(document.querySelectorAll('iframe')).map((f) => (f.src || '').toLowerCase());
  const captcha = frames.find((src) => src.includes('recaptcha') || src.includes('hcaptcha'));
  if (captcha) return {{ type: 'captcha', detail: clip(captcha) }};
  const keywords = (rules.keywords || []).map((k) => k.toLowerCase());
  for (const selector of rules.dialog_selectors || []) {{
    for (const el of document.querySelectorAll(selector)) {{
      if (!visible(el)) continue;
      const text = (el.innerText || '').toLowerCase();
      if (keywords.some((k) => text.includes(k))) return {{ type: 'dialog', detail: clip(el.innerText) }};
    }}
  }}
  const url = location.href.toLowerCase();
  const body = document.body ? document.body.innerText.toLowerCase() : '';
  for (const marker of rules.interstitial_markers || []) {{
    const needle = marker.toLowerCase();
    if (url.includes(needle) || body.includes(needle)) return {{ type: 'interstitial', detail: clip(marker) }};
  }}
  return null;
}})()"#,
        visible = VISIBLE_FN,
        rules = rules
    )
}

/// Clicks the innermost visible clickable element whose text matches.
pub(crate) fn click_text_script(text: &str) -> String {
    format!(
        r#"(() => {{
  {visible}
  const needle = {text}.trim().toLowerCase();
  const candidates = Array.from(document.querySelectorAll('button, a, [role="button"], [role="menuitem"], [role="option"], li, span, div'))
    .filter((el) => visible(el) && (el.innerText || '').trim().toLowerCase() === needle);
  const target = candidates[candidates.length - 1];
  if (!target) return false;
  target.scrollIntoView({{ block: 'center' }});
  target.click();
  return true;
}})()"#,
        visible = VISIBLE_FN,
        text = literal(text)
    )
}

/// Empties an input and lets frameworks observe the change.
pub(crate) fn clear_script(selector: &str) -> String {
    format!(
        r#"(() => {{
  const el = document.querySelector({selector});
  if (!el) return false;
  el.focus();
  if ('value' in el) el.value = ''; else el.textContent = '';
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;
}})()"#,
        selector = literal(selector)
    )
}
