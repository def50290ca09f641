use action_primitives::ActionExecutor;
use formrunner_core_types::{Blocker, BlockerRules, Probe};
use serde_json::Value;
use tracing::{debug, warn};

/// Asks the page whether anything is standing in the way.
#[derive(Debug, Clone, Default)]
pub struct BlockerProbe {
    rules: BlockerRules,
}

impl BlockerProbe {
    pub fn new(rules: BlockerRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &BlockerRules {
        &self.rules
    }

    /// First blocker on the page. Probe failures count as "nothing found".
    pub async fn detect(&self, executor: &dyn ActionExecutor) -> Option<Blocker> {
        match executor.probe(&Probe::Blockers(self.rules.clone())).await {
            Ok(Value::Null) => None,
            Ok(value) => match serde_json::from_value::<Blocker>(value) {
                Ok(blocker) => {
                    debug!(kind = ?blocker.kind, detail = %blocker.detail, "Blocker detected");
                    Some(blocker)
                }
                Err(err) => {
                    warn!(error = %err, "Unrecognised blocker probe answer");
                    None
                }
            },
            Err(err) => {
                warn!(error = %err, "Blocker probe failed");
                None
            }
        }
    }
}

pub fn describe(reason: &str, blocker: Option<&Blocker>) -> String {
    match blocker {
        Some(blocker) => format!("{}: {:?} ({})", reason, blocker.kind, blocker.detail),
        None => reason.to_string(),
    }
}
