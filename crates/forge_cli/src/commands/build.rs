//! Build command - Generate a project straight from a plan.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};
use tracing::info;

use super::{load_existing, Host, SessionArgs};

#[derive(Args)]
#[command(group(ArgGroup::new("plan_source").required(true).args(["plan", "plan_file"])))]
pub struct BuildArgs {
    /// Plan text to build from
    #[arg(long)]
    pub plan: Option<String>,

    /// File holding the plan text
    #[arg(long)]
    pub plan_file: Option<PathBuf>,

    #[command(flatten)]
    pub session: SessionArgs,
}

impl BuildArgs {
    fn plan_text(&self) -> Result<String> {
        let text = match (&self.plan, &self.plan_file) {
            (Some(plan), _) => plan.clone(),
            (None, Some(path)) => {
                if !path.is_file() {
                    anyhow::bail!("Plan file not found: {}", path.display());
                }
                fs::read_to_string(path)
                    .with_context(|| format!("Failed to read plan file {}", path.display()))?
            }
            (None, None) => anyhow::bail!("Missing argument: --plan or --plan-file"),
        };

        if text.trim().is_empty() {
            anyhow::bail!("Invalid argument: the plan is empty");
        }
        Ok(text)
    }
}

pub async fn execute(args: BuildArgs) -> Result<()> {
    let plan = args.plan_text()?;
    let existing = load_existing(args.session.existing.as_deref())?;

    let mut host = Host::open(&args.session)?;
    info!("Building from a {} character plan", plan.len());
    if !host.session.build(&plan, existing).await {
        anyhow::bail!("The build could not be started");
    }
    host.deliver(&args.session).await
}
