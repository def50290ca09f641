use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{print_structured, OutputFormat};
use crate::engine::{load_plan, load_workflow};

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Navigation workflow (YAML)
    #[arg(short, long, value_name = "FILE")]
    pub workflow: Option<PathBuf>,

    /// Form plan (YAML)
    #[arg(short, long, value_name = "FILE")]
    pub plan: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize)]
struct ValidationReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    workflow: Option<WorkflowSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<PlanSummary>,
}

#[derive(Debug, Serialize)]
struct WorkflowSummary {
    name: String,
    steps: Vec<String>,
    recovery_checks: usize,
}

#[derive(Debug, Serialize)]
struct PlanSummary {
    name: String,
    fields: Vec<String>,
    sub_steps: usize,
}

pub async fn cmd_validate(args: ValidateArgs, output: OutputFormat) -> Result<()> {
    if args.workflow.is_none() && args.plan.is_none() {
        bail!("Nothing to validate: pass --workflow and/or --plan");
    }

    let mut report = ValidationReport::default();
    if let Some(path) = &args.workflow {
        let workflow = load_workflow(path)
            .await
            .with_context(|| format!("Invalid workflow {}", path.display()))?;
        report.workflow = Some(WorkflowSummary {
            steps: workflow.steps.iter().map(|step| step.name.clone()).collect(),
            recovery_checks: workflow.recovery.len(),
            name: workflow.name,
        });
    }
    if let Some(path) = &args.plan {
        let plan = load_plan(path)
            .await
            .with_context(|| format!("Invalid form plan {}", path.display()))?;
        report.plan = Some(PlanSummary {
            sub_steps: plan.fields.iter().map(|field| field.sub_steps.len()).sum(),
            fields: plan.fields.iter().map(|field| field.name.clone()).collect(),
            name: plan.name,
        });
    }

    if print_structured(&report, &output)? {
        return Ok(());
    }
    if let Some(workflow) = &report.workflow {
        println!(
            "Workflow '{}' is valid: {} step(s), {} recovery check(s)",
            workflow.name,
            workflow.steps.len(),
            workflow.recovery_checks
        );
        println!("  {}", workflow.steps.join(" -> "));
    }
    if let Some(plan) = &report.plan {
        println!(
            "Form plan '{}' is valid: {} field(s), {} sub-step(s)",
            plan.name,
            plan.fields.len(),
            plan.sub_steps
        );
    }
    Ok(())
}
