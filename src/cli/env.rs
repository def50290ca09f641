use clap::Parser;
use std::path::PathBuf;

use super::commands::Commands;
use super::output::OutputFormat;

/// Resumable browser form workflows with human handoff
#[derive(Parser)]
#[command(name = "formrunner", author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// YAML configuration file; defaults to ./config/formrunner.yaml
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Format of command results on stdout
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Human, global = true)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}
