use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use batch_runner::{BatchError, BatchResult};
use cdp_adapter::CdpSession;
use clap::Args;
use formrunner_core_types::BrowserSession;
use human_handoff::{PauseNotice, StdinResume};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::cli::context::CliContext;
use crate::cli::output::{print_structured, OutputFormat};
use crate::config::AppConfig;
use crate::engine::{assemble, load_plan, load_workflow, open_store};
use crate::items::load_items;

pub const NOTHING_TO_RESUME: &str = "No handoff state found; nothing to resume";

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Form plan (YAML) listing fields and their sub-steps
    #[arg(short, long, value_name = "FILE")]
    pub plan: PathBuf,

    /// Work items, a JSON array or a CSV file with headers
    #[arg(short, long, value_name = "FILE")]
    pub items: PathBuf,

    /// Navigation workflow (YAML) run before each form
    #[arg(short, long, value_name = "FILE")]
    pub workflow: Option<PathBuf>,

    /// Continue from the saved handoff state
    #[arg(long)]
    pub resume: bool,

    /// Handoff state file
    #[arg(long, value_name = "PATH")]
    pub checkpoint: Option<PathBuf>,

    /// Record pauses without waiting for the operator
    #[arg(long)]
    pub no_wait: bool,

    /// Process at most this many items
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// DevTools endpoint of a running browser
    #[arg(long, value_name = "URL")]
    pub cdp_url: Option<String>,

    /// Template variables (key=value)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,
}

impl RunArgs {
    /// Invocation flags take precedence over configuration.
    pub fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(path) = &self.checkpoint {
            config.checkpoint.path = path.clone();
        }
        if self.no_wait {
            config.handoff.wait = false;
        }
        if let Some(size) = self.batch_size {
            config.batch.size = Some(size);
        }
        if let Some(url) = &self.cdp_url {
            config.browser.cdp_url = Some(url.clone());
        }
        config
    }
}

pub fn parse_vars(raw: &[String]) -> Result<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();
    for entry in raw {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("Invalid variable '{}': expected key=value", entry);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid variable '{}': empty key", entry);
        }
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let config = args.apply(ctx.config().clone());
    let variables = parse_vars(&args.vars)?;

    let plan = load_plan(&args.plan)
        .await
        .with_context(|| format!("Failed to load form plan {}", args.plan.display()))?;
    let workflow = match &args.workflow {
        Some(path) => Some(
            load_workflow(path)
                .await
                .with_context(|| format!("Failed to load workflow {}", path.display()))?,
        ),
        None => None,
    };
    let items = load_items(&args.items)
        .await
        .with_context(|| format!("Failed to load items {}", args.items.display()))?;
    info!(items = items.len(), plan = %plan.name, "Loaded work items");

    if args.resume && !open_store(&config).exists().await {
        println!("{}", NOTHING_TO_RESUME);
        return Ok(());
    }

    let session = Arc::new(
        CdpSession::connect(&config.cdp_config())
            .await
            .context("Failed to connect to browser")?,
    );
    let engine = assemble(
        &config,
        session.clone() as Arc<dyn BrowserSession>,
        Arc::new(StdinResume),
        plan,
        workflow,
        variables,
    )?;

    let notices = if config.handoff.wait {
        None
    } else {
        Some(tokio::spawn(report_pauses(engine.handoff.subscribe())))
    };

    let outcome = if args.resume {
        engine.orchestrator.resume(&items).await
    } else {
        Ok(engine.orchestrator.process(&items).await)
    };

    if let Some(task) = notices {
        task.abort();
    }
    if config.browser.cdp_url.is_none() {
        session.close().await;
    }

    let batch = match outcome {
        Ok(batch) => batch,
        Err(BatchError::NothingToResume) => {
            println!("{}", NOTHING_TO_RESUME);
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    if !print_structured(&batch, &output)? {
        print_batch(&batch, &config);
    }
    Ok(())
}

/// With waiting disabled nobody sees the stdin prompt, so pauses are
/// reported as they happen.
async fn report_pauses(mut notices: broadcast::Receiver<PauseNotice>) {
    loop {
        match notices.recv().await {
            Ok(notice) => {
                let item = notice
                    .item_index
                    .map(|index| format!("item {}", index))
                    .unwrap_or_else(|| "run".to_string());
                println!("Paused {}: {}", item, notice.reason);
                if let Some(path) = &notice.screenshot_path {
                    println!("  screenshot: {}", path.display());
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "Pause notices dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_batch(batch: &BatchResult, config: &AppConfig) {
    println!(
        "Processed {} item(s): {} successful, {} failed",
        batch.total - batch.skipped.len(),
        batch.successful,
        batch.failed
    );
    if !batch.skipped.is_empty() {
        let skipped: Vec<String> = batch.skipped.iter().map(usize::to_string).collect();
        println!("Skipped (completed earlier): {}", skipped.join(", "));
    }

    for outcome in &batch.outcomes {
        println!(
            "  [{}] {} ({} ms)",
            outcome.index, outcome.status, outcome.result.execution_time_ms
        );
        if let Some(error) = &outcome.error {
            println!("      error: {}", error);
        }
        for (field, reason) in &outcome.result.fields_failed {
            println!("      {}: {}", field, reason);
        }
    }

    if batch.failed > 0 {
        println!(
            "Handoff state kept at {}; rerun with --resume to continue",
            config.checkpoint.path.display()
        );
    }
}
