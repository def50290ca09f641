//! Human handoff
//!
//! Detects blockers (captchas, verification dialogs, interstitials),
//! persists the run, tells the operator, and waits for a resume signal.

pub mod blockers;
pub mod controller;
pub mod signal;

pub use blockers::BlockerProbe;
pub use controller::{HandoffConfig, HandoffController, HandoffOutcome, PauseNotice};
pub use signal::{AutoResume, ChannelResume, ResumeDecision, ResumeHandle, ResumeSignal, StdinResume};
