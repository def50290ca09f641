//! Workflow definition types

use std::collections::{BTreeMap, HashSet};

use action_primitives::Action;
use serde::{Deserialize, Serialize};

use crate::errors::FlowError;
use crate::recovery::{Condition, RecoveryCheck, RecoveryTable};

/// A named list of steps plus the recovery table consulted when a step
/// finds the browser somewhere unexpected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub steps: Vec<StepDefinition>,

    /// Ordered recovery checks; must end with a `default` entry when set
    #[serde(default)]
    pub recovery: Vec<RecoveryCheck>,

    /// Values for `{{name}}` placeholders in actions
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

impl Workflow {
    pub fn from_yaml_str(raw: &str) -> Result<Self, FlowError> {
        let workflow: Workflow = serde_yaml::from_str(raw)?;
        workflow.validate()?;
        Ok(workflow)
    }

    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.name == name)
    }

    pub fn step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|step| step.name == name)
    }

    pub fn first_step(&self) -> Option<&StepDefinition> {
        self.steps.first()
    }

    /// Router built from `recovery`. Without declared checks every
    /// recovery restarts at the first step.
    pub fn recovery_table(&self) -> Result<RecoveryTable, FlowError> {
        if !self.recovery.is_empty() {
            return RecoveryTable::new(self.recovery.clone());
        }
        match self.first_step() {
            Some(first) => Ok(RecoveryTable::restart_at(&first.name)),
            None => Err(FlowError::InvalidWorkflow(format!(
                "workflow '{}' has no steps",
                self.name
            ))),
        }
    }

    /// Checks names, jump targets and the recovery table.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.steps.is_empty() {
            return Err(FlowError::InvalidWorkflow(format!(
                "workflow '{}' has no steps",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name.as_str()) {
                return Err(FlowError::InvalidWorkflow(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }
        }

        for step in &self.steps {
            for target in step.transitions.jump_targets() {
                if self.step_index(target).is_none() {
                    return Err(FlowError::InvalidWorkflow(format!(
                        "step '{}' jumps to unknown step '{}'",
                        step.name, target
                    )));
                }
            }
        }

        for target in self.recovery_table()?.targets() {
            if self.step_index(target).is_none() {
                return Err(FlowError::InvalidWorkflow(format!(
                    "recovery routes to unknown step '{}'",
                    target
                )));
            }
        }
        Ok(())
    }
}

/// One named unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Expected page state before acting; empty means always valid
    #[serde(default)]
    pub validators: BTreeMap<Predicate, String>,

    #[serde(default)]
    pub actions: Vec<Action>,

    #[serde(default)]
    pub transitions: TransitionRules,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            validators: BTreeMap::new(),
            actions: Vec::new(),
            transitions: TransitionRules::default(),
        }
    }

    pub fn expect(mut self, predicate: Predicate, value: impl Into<String>) -> Self {
        self.validators.insert(predicate, value.into());
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn on_success(mut self, transition: Transition) -> Self {
        self.transitions.on_success = Some(transition);
        self
    }

    pub fn on_validation_fail(mut self, transition: Transition) -> Self {
        self.transitions.on_validation_fail = Some(transition);
        self
    }

    pub fn on_error(mut self, transition: Transition) -> Self {
        self.transitions.on_error = Some(transition);
        self
    }

    pub fn retries(mut self, max_retries: u32, backoff_ms: u64) -> Self {
        self.transitions.max_retries = max_retries;
        self.transitions.retry_backoff_ms = backoff_ms;
        self
    }
}

/// Validator predicates, keyed by what they inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    UrlContains,
    UrlNotContains,
    TitleContains,
    TextVisible,
    ElementExists,
    ElementVisible,
}

impl Predicate {
    pub fn condition(self, expected: &str) -> Condition {
        let expected = expected.to_string();
        match self {
            Predicate::UrlContains => Condition::UrlContains(expected),
            Predicate::UrlNotContains => Condition::UrlNotContains(expected),
            Predicate::TitleContains => Condition::TitleContains(expected),
            Predicate::TextVisible => Condition::TextVisible(expected),
            Predicate::ElementExists => Condition::ElementExists(expected),
            Predicate::ElementVisible => Condition::ElementVisible(expected),
        }
    }
}

/// Transition rules keyed by step outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionRules {
    #[serde(default)]
    pub on_success: Option<Transition>,

    #[serde(default)]
    pub on_validation_fail: Option<Transition>,

    #[serde(default)]
    pub on_error: Option<Transition>,

    /// Attempts after the first before the failure transition fires
    #[serde(default)]
    pub max_retries: u32,

    /// Fixed wait between attempts
    #[serde(default)]
    pub retry_backoff_ms: u64,
}

impl TransitionRules {
    fn jump_targets(&self) -> Vec<&str> {
        let mut targets = Vec::new();
        for transition in [&self.on_success, &self.on_validation_fail, &self.on_error]
            .into_iter()
            .flatten()
        {
            transition.collect_targets(&mut targets);
        }
        targets
    }
}

/// What happens after a step outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Transition {
    /// Advance by index; past the last step the workflow completes
    Next,

    /// Jump to a named step; no target re-enters the current step
    Goto {
        #[serde(default)]
        target_step: Option<String>,
    },

    /// Re-enter a step (the current one by default)
    Retry {
        #[serde(default)]
        retry_step: Option<String>,
    },

    /// Finish the whole workflow as success
    Skip,

    /// Hard-fail
    Stop {
        #[serde(default)]
        reason: Option<String>,
    },

    /// Suspend through the handoff controller
    Pause {
        #[serde(default)]
        reason: Option<String>,
    },

    /// First satisfied check decides
    Check { checks: Vec<ConditionalCheck> },

    /// Ask the recovery router where the browser really is
    Recover,
}

impl Transition {
    pub fn goto(step: impl Into<String>) -> Self {
        Transition::Goto {
            target_step: Some(step.into()),
        }
    }

    pub fn stop() -> Self {
        Transition::Stop { reason: None }
    }

    fn collect_targets<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Transition::Goto {
                target_step: Some(target),
            }
            | Transition::Retry {
                retry_step: Some(target),
            } => out.push(target),
            Transition::Check { checks } => {
                for check in checks {
                    check.then.collect_targets(out);
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalCheck {
    pub when: Condition,
    pub then: Transition,
}
