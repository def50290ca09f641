use std::path::PathBuf;

use anyhow::Result;
use checkpoint_store::HandoffState;
use clap::Args;

use crate::cli::context::CliContext;
use crate::cli::output::{print_structured, OutputFormat};
use crate::cli::run::NOTHING_TO_RESUME;
use crate::engine::open_store;

#[derive(Args, Clone, Debug)]
pub struct StatusArgs {
    /// Handoff state file
    #[arg(long, value_name = "PATH")]
    pub checkpoint: Option<PathBuf>,
}

pub async fn cmd_status(args: StatusArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let mut config = ctx.config().clone();
    if let Some(path) = args.checkpoint {
        config.checkpoint.path = path;
    }
    let store = open_store(&config);

    let Some(state) = store.load().await else {
        println!("{}", NOTHING_TO_RESUME);
        return Ok(());
    };

    if !print_structured(&state, &output)? {
        print_state(&state, &store.location());
    }
    Ok(())
}

fn print_state(state: &HandoffState, location: &str) {
    let checkpoint = &state.checkpoint;
    println!("Handoff state: {}", location);
    println!("  reason:    {}", state.reason);
    println!("  saved at:  {}", state.timestamp.to_rfc3339());
    println!("  stage:     {}", checkpoint.stage);
    if let Some(index) = checkpoint.item_index {
        println!("  item:      {}", index);
    }
    if let Some(step) = &checkpoint.step {
        println!("  step:      {}", step);
    }
    if let Some(field) = &checkpoint.field {
        match checkpoint.line_index {
            Some(line) => println!("  field:     {} (line {})", field, line),
            None => println!("  field:     {}", field),
        }
    }
    if let Some(sub_step) = &checkpoint.sub_step {
        println!("  sub-step:  {}", sub_step);
    }
    if let Some(done) = &checkpoint.last_completed_sub_step {
        println!("  completed: {}", done);
    }
    if let Some(blocker) = &state.blocker {
        println!("  blocker:   {:?}: {}", blocker.kind, blocker.detail);
    }
    if let Some(url) = &state.current_url {
        println!("  page:      {}", url);
    }
    if let Some(path) = &state.screenshot_path {
        println!("  screenshot: {}", path.display());
    }
    println!(
        "  result:    {} ({} filled, {} failed)",
        state.result.status,
        state.result.fields_filled.len(),
        state.result.fields_failed.len()
    );
}
