//! Form plans: which item values go into which fields, and how

use std::collections::HashSet;

use action_primitives::Action;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BatchError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormPlan {
    pub name: String,
    pub fields: Vec<FieldPlan>,
}

/// One form field. Array values are filled line by line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldPlan {
    pub name: String,

    /// Item key holding the value; the field name when absent
    #[serde(default)]
    pub source: Option<String>,

    pub sub_steps: Vec<SubStep>,
}

/// Finest unit of progress; completed sub-steps are not repeated on resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubStep {
    pub name: String,
    pub actions: Vec<Action>,
}

impl SubStep {
    pub fn new(name: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            name: name.into(),
            actions,
        }
    }
}

impl FieldPlan {
    pub fn new(name: impl Into<String>, sub_steps: Vec<SubStep>) -> Self {
        Self {
            name: name.into(),
            source: None,
            sub_steps,
        }
    }

    pub fn from_source(mut self, key: impl Into<String>) -> Self {
        self.source = Some(key.into());
        self
    }

    pub fn source_key(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.name)
    }

    /// Value for this field in `item`; `null` and missing both mean "not set".
    pub fn value_in<'a>(&self, item: &'a Value) -> Option<&'a Value> {
        item.get(self.source_key()).filter(|value| !value.is_null())
    }

    pub fn sub_step_order(&self) -> Vec<&str> {
        self.sub_steps.iter().map(|s| s.name.as_str()).collect()
    }
}

impl FormPlan {
    pub fn new(name: impl Into<String>, fields: Vec<FieldPlan>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, BatchError> {
        let plan: FormPlan = serde_yaml::from_str(raw)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        let mut names = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(BatchError::InvalidPlan(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
            if field.sub_steps.is_empty() {
                return Err(BatchError::InvalidPlan(format!(
                    "field '{}' has no sub-steps",
                    field.name
                )));
            }
            let mut steps = HashSet::new();
            for sub_step in &field.sub_steps {
                if !steps.insert(sub_step.name.as_str()) {
                    return Err(BatchError::InvalidPlan(format!(
                        "field '{}' repeats sub-step '{}'",
                        field.name, sub_step.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PLAN: &str = r##"
name: invoice_lines
fields:
  - name: customer
    sub_steps:
      - name: type
        actions:
          - kind: type
            selector: "#partner"
            text: "{{value}}"
      - name: pick
        actions:
          - kind: click
            target: { text: "{{value}}" }
  - name: lines
    source: invoice_lines
    sub_steps:
      - name: add_line
        actions:
          - kind: click
            target: { text: "Add a line" }
"##;

    #[test]
    fn parses_yaml_plan() {
        let plan = FormPlan::from_yaml_str(PLAN).unwrap();
        assert_eq!(plan.fields.len(), 2);
        assert_eq!(plan.fields[0].sub_step_order(), vec!["type", "pick"]);
        assert_eq!(plan.fields[1].source_key(), "invoice_lines");
        assert_eq!(plan.field_index("lines"), Some(1));
    }

    #[test]
    fn missing_and_null_values_are_unset() {
        let field = FieldPlan::new("notes", vec![SubStep::new("type", Vec::new())]);
        assert!(field.value_in(&json!({"notes": null})).is_none());
        assert!(field.value_in(&json!({})).is_none());
        assert_eq!(field.value_in(&json!({"notes": "x"})), Some(&json!("x")));
    }

    #[test]
    fn repeated_names_are_rejected() {
        let plan = FormPlan::new(
            "dup",
            vec![FieldPlan::new(
                "a",
                vec![SubStep::new("s", Vec::new()), SubStep::new("s", Vec::new())],
            )],
        );
        assert!(matches!(plan.validate(), Err(BatchError::InvalidPlan(_))));
    }
}
