//! FormRunner
//!
//! Command-line front end for resumable form workflows: loads
//! configuration and work items, connects to the browser, and drives the
//! batch orchestrator.

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod items;

pub use config::AppConfig;
pub use engine::{assemble, Engine};
pub use errors::FormRunnerError;
