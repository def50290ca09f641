//! Retry strategy for failing steps

use action_primitives::ActionError;
use tokio::time::{sleep, Duration};
use tracing::info;

use crate::types::TransitionRules;

/// Bounded retry with a fixed backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_rules(rules: &TransitionRules) -> Self {
        Self {
            max_retries: rules.max_retries,
            backoff: Duration::from_millis(rules.retry_backoff_ms),
        }
    }

    /// Total attempts including the first
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn should_retry(&self, attempt: u32, error: Option<&ActionError>) -> bool {
        if error.is_some_and(ActionError::is_fatal) {
            return false;
        }
        attempt < self.max_retries
    }

    /// Sleeps before attempt `attempt` (zero-based); the first attempt runs
    /// immediately.
    pub async fn pause_before(&self, step: &str, attempt: u32) {
        if attempt == 0 {
            return;
        }
        info!(
            step,
            attempt,
            backoff_ms = self.backoff.as_millis() as u64,
            "Retrying step"
        );
        if !self.backoff.is_zero() {
            sleep(self.backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_are_bounded() {
        let policy = RetryPolicy {
            max_retries: 2,
            backoff: Duration::from_millis(10),
        };
        assert_eq!(policy.attempts(), 3);
        assert!(policy.should_retry(0, None));
        assert!(policy.should_retry(1, None));
        assert!(!policy.should_retry(2, None));
    }

    #[test]
    fn fatal_errors_are_never_retried() {
        let policy = RetryPolicy {
            max_retries: 5,
            backoff: Duration::ZERO,
        };
        let lost = ActionError::SessionLost("closed".into());
        assert!(!policy.should_retry(0, Some(&lost)));
        let missing = ActionError::TargetNotFound("#x".into());
        assert!(policy.should_retry(0, Some(&missing)));
    }
}
