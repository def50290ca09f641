//! Bounded fixed-interval polling

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::errors::ActionError;

/// How long to keep checking a condition.
///
/// Timeouts are an attempt count at a fixed interval, not a wall-clock
/// deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_timeout(10_000, 500)
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Enough attempts at `interval_ms` to cover `timeout_ms`.
    pub fn from_timeout(timeout_ms: u64, interval_ms: u64) -> Self {
        let interval_ms = interval_ms.max(1);
        let attempts = (timeout_ms.saturating_add(interval_ms - 1) / interval_ms).max(1);
        Self::new(
            Duration::from_millis(interval_ms),
            u32::try_from(attempts).unwrap_or(u32::MAX),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Found(T),
    TimedOut { attempts: u32 },
}

impl<T> PollOutcome<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, PollOutcome::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            PollOutcome::Found(value) => Some(value),
            PollOutcome::TimedOut { .. } => None,
        }
    }
}

/// Runs `check` until it yields a value or the attempts run out.
///
/// `Ok(None)` and non-fatal errors both mean "not yet". A fatal error ends
/// polling immediately.
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, mut check: F) -> Result<PollOutcome<T>, ActionError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, ActionError>>,
{
    for attempt in 0..policy.max_attempts {
        match check(attempt).await {
            Ok(Some(value)) => return Ok(PollOutcome::Found(value)),
            Ok(None) => {}
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => debug!(attempt, error = %err, "poll check failed; treating as not yet"),
        }
        if attempt + 1 < policy.max_attempts {
            sleep(policy.interval).await;
        }
    }
    Ok(PollOutcome::TimedOut {
        attempts: policy.max_attempts,
    })
}
