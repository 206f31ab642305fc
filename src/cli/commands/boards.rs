//! `boards`: list boards, board options or PlatformIO environments

use anyhow::{Result, bail};
use std::path::PathBuf;

use super::load_config;
use crate::cli::args::Cli;
use crate::engine::Engine;
use crate::models::ToolchainKind;

pub async fn execute_boards_command(
    cli: &Cli,
    kind: ToolchainKind,
    fqbn: Option<String>,
    artifact: Option<PathBuf>,
) -> Result<()> {
    let engine = Engine::new(load_config(cli)?)?;
    let resolver = engine.resolver(kind)?;

    match kind {
        ToolchainKind::Arduino => match fqbn {
            Some(fqbn) => {
                let options = resolver.board_options(&fqbn).await?;
                println!("⚙️  {} options for {}", options.len(), fqbn);
                for option in options {
                    println!("  {} ({})", option.name, option.label);
                    for value in option.values {
                        let marker = if value.is_default { "*" } else { " " };
                        println!("    {} {:<20} {}", marker, value.value, value.label);
                    }
                }
            }
            None => {
                let boards = resolver.list_boards().await?;
                println!("📋 {} boards", boards.len());
                for board in boards {
                    println!("  {:<40} {}", board.fqbn, board.name);
                }
            }
        },
        ToolchainKind::PlatformIO => {
            let Some(artifact) = artifact else {
                bail!("Listing environments needs a project, pass --artifact <DIR>");
            };
            engine.artifacts().accept(kind, &artifact).await?;
            let environments = resolver.list_environments().await?;
            println!("📋 {} environments", environments.len());
            for env in environments {
                println!("  {}", env);
            }
        }
    }
    Ok(())
}
