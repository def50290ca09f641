//! Browser action primitives
//!
//! This crate turns one typed [`Action`] into calls against a
//! [`BrowserSession`](formrunner_core_types::BrowserSession):
//! - six primitives: navigate, click, type, wait, probe, screenshot
//! - bounded fixed-interval polling for every wait
//! - normalized [`ActionReport`]s and typed [`ActionError`]s

pub mod errors;
mod primitives;
pub mod types;
mod waiting;

pub use errors::*;
pub use primitives::*;
pub use types::*;
pub use waiting::*;
