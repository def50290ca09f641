//! Operator resume signals

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::controller::PauseNotice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    /// Carry on from the saved position
    Continue,
    /// Give up on the current item; the batch goes on
    Abandon,
}

#[async_trait]
pub trait ResumeSignal: Send + Sync {
    async fn wait_for_resume(&self, notice: &PauseNotice) -> ResumeDecision;
}

/// Continues immediately; for unattended runs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoResume;

#[async_trait]
impl ResumeSignal for AutoResume {
    async fn wait_for_resume(&self, notice: &PauseNotice) -> ResumeDecision {
        info!(reason = %notice.reason, "Auto-resuming handoff");
        ResumeDecision::Continue
    }
}

/// Waits for the operator to press Enter on stdin.
///
/// Typing `abort` or `skip` abandons the item. A closed stdin abandons too,
/// since nobody is there to confirm.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinResume;

#[async_trait]
impl ResumeSignal for StdinResume {
    async fn wait_for_resume(&self, notice: &PauseNotice) -> ResumeDecision {
        println!();
        println!("Human intervention required: {}", notice.reason);
        if let Some(url) = &notice.current_url {
            println!("  page: {}", url);
        }
        if let Some(path) = &notice.screenshot_path {
            println!("  screenshot: {}", path.display());
        }
        println!("Resolve the issue in the browser, then press Enter (or type 'abort').");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        match lines.next_line().await {
            Ok(Some(line)) => parse_answer(&line),
            Ok(None) => {
                warn!("stdin closed while waiting for operator");
                ResumeDecision::Abandon
            }
            Err(err) => {
                warn!(error = %err, "failed to read operator input");
                ResumeDecision::Abandon
            }
        }
    }
}

fn parse_answer(line: &str) -> ResumeDecision {
    match line.trim().to_ascii_lowercase().as_str() {
        "abort" | "skip" | "abandon" => ResumeDecision::Abandon,
        _ => ResumeDecision::Continue,
    }
}

/// Programmatic signal driven through a [`ResumeHandle`].
pub struct ChannelResume {
    rx: Mutex<mpsc::Receiver<ResumeDecision>>,
}

#[derive(Clone)]
pub struct ResumeHandle {
    tx: mpsc::Sender<ResumeDecision>,
}

impl ChannelResume {
    pub fn new() -> (Self, ResumeHandle) {
        let (tx, rx) = mpsc::channel(8);
        (Self { rx: Mutex::new(rx) }, ResumeHandle { tx })
    }
}

impl ResumeHandle {
    pub async fn resume(&self) -> bool {
        self.tx.send(ResumeDecision::Continue).await.is_ok()
    }

    pub async fn abandon(&self) -> bool {
        self.tx.send(ResumeDecision::Abandon).await.is_ok()
    }
}

#[async_trait]
impl ResumeSignal for ChannelResume {
    async fn wait_for_resume(&self, notice: &PauseNotice) -> ResumeDecision {
        info!(reason = %notice.reason, "Waiting for resume signal");
        match self.rx.lock().await.recv().await {
            Some(decision) => decision,
            None => {
                warn!("resume channel closed; abandoning item");
                ResumeDecision::Abandon
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice() -> PauseNotice {
        PauseNotice {
            reason: "captcha".into(),
            ..PauseNotice::default()
        }
    }

    #[test]
    fn operator_answers() {
        assert_eq!(parse_answer(""), ResumeDecision::Continue);
        assert_eq!(parse_answer(" ABORT \n"), ResumeDecision::Abandon);
        assert_eq!(parse_answer("skip"), ResumeDecision::Abandon);
    }

    #[tokio::test]
    async fn channel_delivers_decisions_in_order() {
        let (signal, handle) = ChannelResume::new();
        assert!(handle.abandon().await);
        assert!(handle.resume().await);
        assert_eq!(signal.wait_for_resume(&notice()).await, ResumeDecision::Abandon);
        assert_eq!(signal.wait_for_resume(&notice()).await, ResumeDecision::Continue);
    }

    #[tokio::test]
    async fn dropped_handle_abandons() {
        let (signal, handle) = ChannelResume::new();
        drop(handle);
        assert_eq!(signal.wait_for_resume(&notice()).await, ResumeDecision::Abandon);
    }

    #[test]
    fn auto_resume_continues() {
        let decision = tokio_test::block_on(AutoResume.wait_for_resume(&notice()));
        assert_eq!(decision, ResumeDecision::Continue);
    }
}
