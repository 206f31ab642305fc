//! `flash`: run one flash job in the foreground

use anyhow::{Result, bail};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

use super::load_config;
use crate::cli::args::Cli;
use crate::engine::Engine;
use crate::models::{BoardOption, FlashRequest, FlasherEvent, Target, ToolchainKind};

pub async fn execute_flash_command(
    cli: &Cli,
    kind: ToolchainKind,
    artifact: PathBuf,
    target: String,
    options: Vec<BoardOption>,
    port: Option<String>,
    skip_hooks: bool,
) -> Result<()> {
    let engine = Engine::new(load_config(cli)?)?;

    let artifact = engine.artifacts().accept(kind, &artifact).await?;
    if let Some(metadata) = &artifact.metadata {
        println!(
            "📦 Firmware {} by {}",
            metadata.version.as_deref().unwrap_or("unknown version"),
            metadata.author.as_deref().unwrap_or("unknown author")
        );
    }

    let target = match kind {
        ToolchainKind::Arduino => Target::board(target, options),
        ToolchainKind::PlatformIO => {
            if !options.is_empty() {
                bail!("Board options only apply to Arduino builds");
            }
            Target::environment(target)
        }
    };
    let mut request = FlashRequest::new(target);
    request.port = port;
    if skip_hooks {
        request = request.without_hooks();
    }

    // Subscribe first so no event of this job is missed
    let mut events = engine.publisher().subscribe();
    let handle = engine.orchestrator().start_flash(kind, request).await?;
    println!(
        "⚡ Flashing with {}{}",
        kind.display_name(),
        if handle.remote { " (remote agent)" } else { "" }
    );

    loop {
        match events.recv().await {
            Ok(FlasherEvent::FlashProgress {
                kind: k,
                step,
                progress,
                ..
            }) if k == kind => println!("[{:>3}%] {}", progress, step),
            Ok(FlasherEvent::FlashLog { kind: k, line }) if k == kind => println!("  {}", line),
            Ok(FlasherEvent::FlashResult {
                kind: k,
                success,
                message,
                error_output,
                ..
            }) if k == kind => {
                if success {
                    println!("✅ {}", message);
                    return Ok(());
                }
                if let Some(output) = error_output {
                    eprintln!("{}", output);
                }
                bail!("{}", message);
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => bail!("The flash job ended without a result"),
        }
    }
}
