//! PlatformIO Core integration

use async_trait::async_trait;
use log::debug;
use std::fs;
use std::path::Path;

use super::process::ToolCommand;
use super::{BuildContext, CliLocator, LineSink, Toolchain};
use crate::config::Limits;
use crate::errors::{FlasherError, Result};
use crate::models::{Target, ToolchainKind};

/// Handler for PlatformIO projects
pub struct PlatformIoCli {
    locator: CliLocator,
    limits: Limits,
}

impl PlatformIoCli {
    pub fn new(locator: CliLocator, limits: Limits) -> Self {
        Self { locator, limits }
    }

    async fn command(&self) -> Result<ToolCommand> {
        let path = self.locator.resolve().await?;
        Ok(ToolCommand::new(path).max_error_lines(self.limits.max_error_lines))
    }

    fn environment(target: &Target) -> Result<&str> {
        match target {
            Target::Environment { name } => Ok(name),
            Target::Board { .. } => Err(FlasherError::Validation(
                "PlatformIO builds need an environment target".to_string(),
            )),
        }
    }

    /// `run` or `remote run`, with the shared environment/project arguments
    fn run_args(ctx: &BuildContext, env: &str, upload: bool) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        if ctx.remote {
            args.push("remote".to_string());
        }
        args.extend(["run", "-e", env, "-d"].map(String::from));
        args.push(ctx.project_dir().display().to_string());
        if upload {
            args.extend(["-t", "upload"].map(String::from));
            if let Some(port) = &ctx.port {
                args.push("--upload-port".to_string());
                args.push(port.clone());
            }
        }
        if ctx.remote {
            args.push("--force-remote".to_string());
        }
        args
    }
}

#[async_trait]
impl Toolchain for PlatformIoCli {
    fn kind(&self) -> ToolchainKind {
        ToolchainKind::PlatformIO
    }

    async fn check_setup(&self) -> Result<()> {
        let cmd = self
            .command()
            .await?
            .arg("--version")
            .timeout(self.limits.package_timeout());
        match cmd.output().await {
            Ok(output) if output.stdout.to_lowercase().contains("platformio") => Ok(()),
            Ok(_) | Err(FlasherError::Toolchain { .. }) => Err(FlasherError::Config(
                "The configured path does not point to PlatformIO-Core".to_string(),
            )),
            Err(e) => Err(e),
        }
    }

    async fn list_environments(&self, project_dir: &Path) -> Result<Vec<String>> {
        let platformio_ini = project_dir.join("platformio.ini");
        if !platformio_ini.exists() {
            return Err(FlasherError::Validation(format!(
                "No platformio.ini found in {}",
                project_dir.display()
            )));
        }
        let content = fs::read_to_string(&platformio_ini)?;
        let environments = parse_environments(&content);
        debug!(
            "Found {} environments in {}",
            environments.len(),
            platformio_ini.display()
        );
        Ok(environments)
    }

    async fn compile(&self, ctx: &BuildContext, sink: LineSink) -> Result<()> {
        let env = Self::environment(&ctx.target)?;
        let cmd = self
            .command()
            .await?
            .args(Self::run_args(ctx, env, false))
            .timeout(self.limits.compile_timeout());
        sink(&format!("🔨 Executing: {}", cmd.display()));
        cmd.run(Some(&sink)).await?;
        Ok(())
    }

    async fn upload(&self, ctx: &BuildContext, sink: LineSink) -> Result<()> {
        let env = Self::environment(&ctx.target)?;
        let cmd = self
            .command()
            .await?
            .args(Self::run_args(ctx, env, true))
            .timeout(self.limits.upload_timeout());
        sink(&format!("🔥 Executing: {}", cmd.display()));
        cmd.run(Some(&sink)).await?;
        Ok(())
    }
}

/// Environment names from the `[env:NAME]` sections, in file order
pub fn parse_environments(content: &str) -> Vec<String> {
    let mut environments = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if let Some(name) = line
            .strip_prefix("[env:")
            .and_then(|s| s.strip_suffix(']'))
            .map(str::trim)
        {
            if !name.is_empty() && !environments.iter().any(|e| e == name) {
                environments.push(name.to_string());
            }
        }
    }
    environments
}
