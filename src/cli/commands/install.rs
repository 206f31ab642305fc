//! `install-toolchain`: bootstrap arduino-cli or PlatformIO Core

use anyhow::{Result, bail};

use super::load_config;
use crate::cli::args::Cli;
use crate::engine::Engine;
use crate::models::ToolchainKind;

pub async fn execute_install_command(cli: &Cli, kind: ToolchainKind) -> Result<()> {
    let engine = Engine::new(load_config(cli)?)?;
    println!("📥 Installing {}", kind.display_name());

    let mut events = engine.installer().install(kind)?;
    while let Some(event) = events.recv().await {
        if !event.finished {
            println!("  {}", event.status_line);
            continue;
        }
        if event.success {
            println!("✅ {}", event.status_line);
            return Ok(());
        }
        bail!("{}", event.status_line);
    }
    bail!("The installer stopped without a result")
}
