use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use crate::cli::context::CliContext;
use crate::engine::open_store;

#[derive(Args, Clone, Debug)]
pub struct ClearArgs {
    /// Handoff state file
    #[arg(long, value_name = "PATH")]
    pub checkpoint: Option<PathBuf>,
}

pub async fn cmd_clear(args: ClearArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.config().clone();
    if let Some(path) = args.checkpoint {
        config.checkpoint.path = path;
    }
    let store = open_store(&config);

    if !store.exists().await {
        println!("No handoff state at {}", store.location());
        return Ok(());
    }
    store.clear().await;
    info!(record = %store.location(), "Handoff state cleared");
    println!("Cleared handoff state at {}", store.location());
    Ok(())
}
