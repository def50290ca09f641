use clap::Subcommand;

use super::clear::ClearArgs;
use super::run::RunArgs;
use super::status::StatusArgs;
use super::validate::ValidateArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Fill a form for every work item, pausing for a human when blocked
    Run(RunArgs),

    /// Show the saved handoff state
    Status(StatusArgs),

    /// Delete the saved handoff state
    Clear(ClearArgs),

    /// Check workflow and form plan definitions without a browser
    Validate(ValidateArgs),
}
