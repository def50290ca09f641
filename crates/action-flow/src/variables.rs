//! `{{name}}` placeholder substitution inside actions

use std::collections::BTreeMap;

use action_primitives::Action;
use serde_json::Value;
use tracing::warn;

use crate::errors::FlowError;

/// Returns `action` with every known placeholder replaced. Unknown
/// placeholders are left in place.
pub fn substitute(action: &Action, vars: &BTreeMap<String, String>) -> Result<Action, FlowError> {
    if vars.is_empty() {
        return Ok(action.clone());
    }
    let mut value =
        serde_json::to_value(action).map_err(|err| FlowError::Substitution(err.to_string()))?;
    replace_in(&mut value, vars);
    serde_json::from_value(value).map_err(|err| FlowError::Substitution(err.to_string()))
}

fn replace_in(value: &mut Value, vars: &BTreeMap<String, String>) {
    match value {
        Value::String(text) => {
            if text.contains("{{") {
                *text = render(text, vars);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| replace_in(item, vars)),
        Value::Object(map) => map.values_mut().for_each(|item| replace_in(item, vars)),
        _ => {}
    }
}

pub fn render(template: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match vars.get(name) {
                    Some(replacement) => out.push_str(replacement),
                    None => {
                        warn!(variable = name, "unknown workflow variable");
                        out.push_str(&rest[start..start + 2 + end + 2]);
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Flattens scalar fields of a JSON object into variables.
pub fn item_variables(item: &Value) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    if let Value::Object(map) = item {
        for (key, value) in map {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            vars.insert(key.clone(), rendered);
        }
    }
    vars
}
