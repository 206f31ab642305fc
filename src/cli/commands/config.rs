//! `config`: write the default configuration file

use anyhow::{Result, bail};
use std::path::PathBuf;

use crate::cli::args::Cli;
use crate::config::FlasherConfig;

pub fn execute_config_command(cli: &Cli, output: Option<PathBuf>, force: bool) -> Result<()> {
    let path = output.unwrap_or_else(|| cli.config_path());
    if path.exists() && !force {
        bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }
    FlasherConfig::default().save(&path)?;
    println!("📝 Wrote default configuration to {}", path.display());
    Ok(())
}
