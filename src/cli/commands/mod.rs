//! CLI command implementations

pub mod boards;
pub mod config;
pub mod flash;
pub mod install;
pub mod ports;
pub mod serve;

use anyhow::Result;

use crate::cli::args::{Cli, Commands};
use crate::config::FlasherConfig;

/// Load the configuration named on the command line, defaults when absent
pub fn load_config(cli: &Cli) -> Result<FlasherConfig> {
    Ok(FlasherConfig::load_or_default(&cli.config_path())?)
}

/// Execute a CLI command
pub async fn execute_command(command: Commands, cli: &Cli) -> Result<()> {
    match command {
        Commands::Serve {
            bind,
            port,
            structured_logs: _,
            log_file: _,
        } => serve::execute_serve_command(cli, bind, port).await,
        Commands::Config { output, force } => config::execute_config_command(cli, output, force),
        Commands::Boards {
            kind,
            fqbn,
            artifact,
        } => boards::execute_boards_command(cli, kind, fqbn, artifact).await,
        Commands::Flash {
            kind,
            artifact,
            target,
            options,
            port,
            skip_hooks,
        } => {
            flash::execute_flash_command(cli, kind, artifact, target, options, port, skip_hooks)
                .await
        }
        Commands::InstallToolchain { kind } => install::execute_install_command(cli, kind).await,
        Commands::Ports => ports::execute_ports_command(),
    }
}
