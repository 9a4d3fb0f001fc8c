//! forge CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Build failure
//! - 4: Configuration error

use std::process::ExitCode;

use clap::Parser;
use forge_session::SessionError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod console;

use commands::{Cli, Commands, SessionFailure};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const BUILD_FAILURE: u8 = 3;
    pub const CONFIG_ERROR: u8 = 4;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "forge=debug"
    } else if cli.quiet {
        "forge=warn"
    } else {
        "forge=info"
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(level.parse().expect("valid log directive"))
        .add_directive("warn".parse().expect("valid log directive"));

    // Logs go to stderr so streamed replies stay clean on stdout.
    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let result = match cli.command {
        Commands::Chat(args) => commands::chat::execute(args).await,
        Commands::Build(args) => commands::build::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    // Typed failures first: their messages carry server text.
    for cause in e.chain() {
        if let Some(failure) = cause.downcast_ref::<SessionFailure>() {
            return match failure {
                SessionFailure::Build(_) => ExitCodes::BUILD_FAILURE,
                SessionFailure::Chat(_) => ExitCodes::GENERAL_ERROR,
            };
        }
        match cause.downcast_ref::<SessionError>() {
            Some(SessionError::Config(_)) => return ExitCodes::CONFIG_ERROR,
            Some(_) => return ExitCodes::GENERAL_ERROR,
            None => {}
        }
    }

    let msg = e.to_string().to_lowercase();
    if msg.contains("build failed") {
        ExitCodes::BUILD_FAILURE
    } else if msg.contains("configuration") || msg.contains("settings") {
        ExitCodes::CONFIG_ERROR
    } else if msg.contains("argument") || msg.contains("not found") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_categorize_config_error() {
        let err: anyhow::Result<()> = Err(SessionError::Config("bad url".to_string()).into());
        let err = err.context("Failed to start session").unwrap_err();
        assert_eq!(categorize_error(&err), ExitCodes::CONFIG_ERROR);
    }

    #[test]
    fn test_categorize_build_failure() {
        let err: anyhow::Error =
            SessionFailure::Build("Endpoint returned 404: not found".to_string()).into();
        assert_eq!(categorize_error(&err), ExitCodes::BUILD_FAILURE);
    }

    #[test]
    fn test_categorize_ignores_server_text() {
        let err: anyhow::Error =
            SessionFailure::Chat("Endpoint returned 404: not found".to_string()).into();
        assert_eq!(categorize_error(&err), ExitCodes::GENERAL_ERROR);

        let err: anyhow::Result<()> = Err(SessionError::Http {
            status: 400,
            body: "missing argument: prompt".to_string(),
        }
        .into());
        let err = err.context("Request failed").unwrap_err();
        assert_eq!(categorize_error(&err), ExitCodes::GENERAL_ERROR);
    }

    #[test]
    fn test_categorize_invalid_args() {
        let err = anyhow::anyhow!("Plan file not found: plan.md");
        assert_eq!(categorize_error(&err), ExitCodes::INVALID_ARGS);
        assert_eq!(
            categorize_error(&anyhow::anyhow!("Chat failed: offline")),
            ExitCodes::GENERAL_ERROR
        );
    }
}
