use super::clear::cmd_clear;
use super::env::CliArgs;
use super::run::cmd_run;
use super::status::cmd_status;
use super::validate::cmd_validate;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx, cli.output.clone()).await,
        Commands::Status(args) => cmd_status(args, ctx, cli.output.clone()).await,
        Commands::Clear(args) => cmd_clear(args, ctx).await,
        Commands::Validate(args) => cmd_validate(args, cli.output.clone()).await,
    }
}
