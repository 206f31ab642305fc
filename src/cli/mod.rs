//! Command Line Interface module

pub mod args;
pub mod commands;

pub use args::*;

use anyhow::Result;

use crate::utils::logging::{init_cli_logging, init_server_logging, level_from_flags};

/// Main CLI application runner
pub async fn run() -> Result<()> {
    let cli = Cli::parse_args();

    match &cli.command {
        Commands::Serve {
            structured_logs,
            log_file,
            ..
        } => init_server_logging(
            *structured_logs,
            log_file.as_deref(),
            Some(level_from_flags(cli.verbose, cli.quiet)),
        )?,
        _ => init_cli_logging(cli.verbose, cli.quiet)?,
    }

    commands::execute_command(cli.command.clone(), &cli).await
}
