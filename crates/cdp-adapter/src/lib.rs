//! Chrome DevTools Protocol implementation of [`BrowserSession`].
//!
//! [`BrowserSession`]: formrunner_core_types::BrowserSession

pub mod config;
pub mod error;
mod scripts;
mod session;

pub use config::CdpConfig;
pub use error::{AdapterError, AdapterErrorKind};
pub use session::CdpSession;
