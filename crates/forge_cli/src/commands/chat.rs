//! Chat command - Describe a project, review the plan, build it.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use forge_session::{export, Phase};

use super::{load_existing, print_snapshot, Host, SessionArgs, SessionFailure};

#[derive(Args)]
pub struct ChatArgs {
    /// What you want built (or asked)
    #[arg(short, long)]
    pub prompt: String,

    /// Extra project context sent with the prompt
    #[arg(short, long, default_value = "")]
    pub context: String,

    /// Build a proposed plan without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Save the transcript as JSON when done
    #[arg(short, long)]
    pub transcript: Option<PathBuf>,

    #[command(flatten)]
    pub session: SessionArgs,
}

pub async fn execute(args: ChatArgs) -> Result<()> {
    let mut host = Host::open(&args.session)?;
    let result = run(&mut host, &args).await;

    if let Some(path) = &args.transcript {
        export::save_snapshot(path, &host.session.snapshot())
            .with_context(|| format!("Failed to save transcript to {}", path.display()))?;
        info!("Transcript saved to {}", path.display());
    }
    result
}

async fn run(host: &mut Host, args: &ChatArgs) -> Result<()> {
    info!("Starting chat");
    host.session.chat(&args.prompt, &args.context, &[]).await;

    if host.interrupted() {
        host.detach().await;
        anyhow::bail!("Interrupted before the reply finished");
    }
    if host.session.phase() == Phase::Error {
        host.detach().await;
        return Err(SessionFailure::chat(&host.session).into());
    }

    let Some(proposal) = host.session.pending_proposal() else {
        host.detach().await;
        if args.session.json {
            print_snapshot(&host.session)?;
        }
        return Ok(());
    };

    // Let the streamed plan finish printing before prompting.
    host.detach().await;
    let confirmed = args.yes || ask_confirmation().await?;
    if !confirmed {
        host.session.reject_proposal(&proposal.id);
        if args.session.json {
            print_snapshot(&host.session)?;
        } else {
            println!("Plan rejected, nothing was built.");
        }
        return Ok(());
    }

    let existing = load_existing(args.session.existing.as_deref())?;
    let build = host
        .session
        .confirm_and_build(&proposal.id, existing)
        .context("The plan could not be confirmed")?;
    host.attach();
    build.await.context("Build task failed")?;
    host.deliver(&args.session).await
}

async fn ask_confirmation() -> Result<bool> {
    let answer = tokio::task::spawn_blocking(|| -> io::Result<bool> {
        print!("\nBuild this project? [y/N] ");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
    })
    .await
    .context("Confirmation prompt failed")??;
    Ok(answer)
}
