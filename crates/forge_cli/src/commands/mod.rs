//! CLI command definitions.
//!
//! This module defines the command structure for the forge CLI and the
//! steps shared by every command: opening a session, loading an existing
//! project and delivering the generated files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use forge_session::{export, Artifact, BuildSession, Phase, SessionConfig};

use crate::console::{Interrupt, LiveConsole};

pub mod build;
pub mod chat;

/// forge - describe a project, confirm the plan, get the files
#[derive(Parser)]
#[command(name = "forge")]
#[command(version, about = "forge - conversational project builder")]
#[command(long_about = r#"
forge talks to a chat endpoint about the project you want, waits for you to
confirm the plan it proposes and then asks a generation endpoint to build it.

WORKFLOWS:
  chat   → Describe a project, review the plan, build on confirmation
  build  → Build straight from a plan you already have

CONFIGURATION:
  <workspace>/.forge/settings.json, then FORGE_CHAT_URL, FORGE_GENERATE_URL,
  FORGE_API_TOKEN and FORGE_STEP_PAUSE_MS from the environment.

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Build failure
  4 - Configuration error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Chat about a project and build it once the plan is confirmed
    Chat(chat::ChatArgs),

    /// Build a project from a plan without chatting first
    Build(build::BuildArgs),
}

/// A request that left the session in the error phase
#[derive(Debug, thiserror::Error)]
pub enum SessionFailure {
    #[error("Chat failed: {0}")]
    Chat(String),
    #[error("Build failed: {0}")]
    Build(String),
}

impl SessionFailure {
    fn message(session: &BuildSession) -> String {
        session
            .last_error()
            .unwrap_or_else(|| "unknown error".to_string())
    }

    pub fn chat(session: &BuildSession) -> Self {
        Self::Chat(Self::message(session))
    }

    pub fn build(session: &BuildSession) -> Self {
        Self::Build(Self::message(session))
    }
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Workspace holding .forge/settings.json (defaults to the current directory)
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Directory the generated files are written to
    #[arg(short, long, default_value = "generated")]
    pub out: PathBuf,

    /// Existing project to send along with modification plans
    #[arg(long)]
    pub existing: Option<PathBuf>,

    /// Print the final session snapshot as JSON instead of streaming it
    #[arg(long)]
    pub json: bool,
}

impl SessionArgs {
    pub fn workspace_root(&self) -> Result<PathBuf> {
        match &self.workspace {
            Some(path) => Ok(path.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }
}

/// Session plus the terminal plumbing attached to it
pub struct Host {
    pub session: BuildSession,
    console: Option<LiveConsole>,
    interrupt: Interrupt,
    streaming: bool,
}

impl Host {
    /// Load configuration and open a session over the HTTP endpoints.
    pub fn open(args: &SessionArgs) -> Result<Self> {
        let root = args.workspace_root()?;
        let config = SessionConfig::from_settings(&root)
            .with_context(|| format!("Failed to load configuration for {}", root.display()))?;
        info!("Chat endpoint: {}", config.chat_url);
        info!("Generation endpoint: {}", config.generate_url);

        let session = BuildSession::from_config(config);
        let interrupt = Interrupt::watch(&session);
        let mut host = Self {
            session,
            console: None,
            interrupt,
            streaming: !args.json,
        };
        host.attach();
        Ok(host)
    }

    /// Start rendering the session to the terminal, unless JSON output was
    /// requested or a console is already attached.
    pub fn attach(&mut self) {
        if self.streaming && self.console.is_none() {
            self.console = Some(LiveConsole::attach(&self.session));
        }
    }

    pub fn interrupted(&self) -> bool {
        self.interrupt.triggered()
    }

    /// Stop rendering, waiting for queued output to be printed.
    pub async fn detach(&mut self) {
        if let Some(console) = self.console.take() {
            console.finish().await;
        }
    }

    /// Finish up after a build: write the files or report the failure.
    pub async fn deliver(&mut self, args: &SessionArgs) -> Result<()> {
        self.detach().await;
        if args.json {
            print_snapshot(&self.session)?;
        }

        if self.interrupted() {
            anyhow::bail!("Interrupted before the build finished");
        }

        match self.session.phase() {
            Phase::Done => {
                let files = self
                    .session
                    .consume_results()
                    .context("Build finished without files")?;
                let written = export::write_artifacts(&args.out, &files)
                    .with_context(|| format!("Failed to write files to {}", args.out.display()))?;

                if !args.json {
                    println!();
                    println!("✅ Wrote {} file(s) to {}", written.len(), args.out.display());
                    for path in &written {
                        println!("  {}", path.display());
                    }
                }
                Ok(())
            }
            _ => Err(SessionFailure::build(&self.session).into()),
        }
    }
}

/// Load the project passed with `--existing`, if any.
pub fn load_existing(path: Option<&Path>) -> Result<Option<Vec<Artifact>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    if !path.is_dir() {
        anyhow::bail!("Existing project not found: {}", path.display());
    }

    let files = export::load_existing_files(path)
        .with_context(|| format!("Failed to read existing project {}", path.display()))?;
    info!("Loaded {} existing files from {}", files.len(), path.display());
    Ok(Some(files))
}

pub fn print_snapshot(session: &BuildSession) -> Result<()> {
    let json = serde_json::to_string_pretty(&session.snapshot())
        .context("Failed to serialize session")?;
    println!("{}", json);
    Ok(())
}
