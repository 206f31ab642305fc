//! `arduino-cli` integration

use async_trait::async_trait;
use log::{debug, info};
use serde_json::Value;
use std::path::Path;

use super::process::ToolCommand;
use super::{BuildContext, CliLocator, LineSink, Toolchain, classify_failure};
use crate::config::{ArduinoSettings, Limits};
use crate::errors::{FlasherError, Result};
use crate::models::{
    BoardSummary, ConfigOption, ConfigValue, CoreDescriptor, LibraryDescriptor, ToolchainKind,
};

/// Drives `arduino-cli` with `--format json`
pub struct ArduinoCli {
    locator: CliLocator,
    settings: ArduinoSettings,
    limits: Limits,
}

impl ArduinoCli {
    pub fn new(locator: CliLocator, settings: ArduinoSettings, limits: Limits) -> Self {
        Self {
            locator,
            settings,
            limits,
        }
    }

    async fn command(&self) -> Result<ToolCommand> {
        let path = self.locator.resolve().await?;
        let mut cmd = ToolCommand::new(path).max_error_lines(self.limits.max_error_lines);
        if !self.settings.additional_urls.is_empty() {
            cmd = cmd.args([
                "--additional-urls".to_string(),
                self.settings.additional_urls.join(","),
            ]);
        }
        Ok(cmd)
    }

    /// Run a package/listing command and return its JSON output
    async fn json<I, S>(&self, args: I) -> Result<Value>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cmd = self
            .command()
            .await?
            .args(args)
            .args(["--format", "json"])
            .timeout(self.limits.package_timeout());
        let output = cmd.output().await?;
        parse_json(&output.stdout)
    }

    async fn installed_core(&self, id: &str) -> Result<CoreDescriptor> {
        let value = self.json(["core", "list"]).await?;
        parse_cores(&value)
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| FlasherError::NotFound(id.to_string()))
    }

    async fn installed_lib(&self, name: &str) -> Result<LibraryDescriptor> {
        let value = self.json(["lib", "list"]).await?;
        parse_installed_libs(&value)
            .into_iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| FlasherError::NotFound(name.to_string()))
    }

    fn sketch_arg(project_dir: &Path) -> String {
        project_dir.display().to_string()
    }
}

#[async_trait]
impl Toolchain for ArduinoCli {
    fn kind(&self) -> ToolchainKind {
        ToolchainKind::Arduino
    }

    async fn check_setup(&self) -> Result<()> {
        let cmd = self
            .command()
            .await?
            .arg("version")
            .timeout(self.limits.package_timeout());
        match cmd.output().await {
            Ok(output) if output.stdout.to_lowercase().contains("arduino") => Ok(()),
            Ok(_) | Err(FlasherError::Toolchain { .. }) => Err(FlasherError::Config(
                "The configured path does not point to arduino-cli".to_string(),
            )),
            Err(e) => Err(e),
        }
    }

    async fn list_boards(&self) -> Result<Vec<BoardSummary>> {
        let value = self.json(["board", "listall"]).await?;
        let boards = parse_boards(&value);
        debug!("arduino-cli reported {} boards", boards.len());
        Ok(boards)
    }

    async fn board_options(&self, fqbn: &str) -> Result<Vec<ConfigOption>> {
        let value = self
            .json(["board", "details", "-b", fqbn])
            .await
            .map_err(|e| match classify_failure(e, fqbn) {
                FlasherError::NotFound(fqbn) => FlasherError::UnknownBoard(fqbn),
                other => other,
            })?;
        Ok(parse_board_options(&value))
    }

    async fn search_cores(&self, query: &str) -> Result<Vec<CoreDescriptor>> {
        let value = self
            .json(["core", "search", query])
            .await
            .map_err(|e| classify_failure(e, query))?;
        Ok(parse_cores(&value))
    }

    async fn install_core(&self, id: &str) -> Result<CoreDescriptor> {
        info!("📦 Installing core {}", id);
        self.command()
            .await?
            .args(["core", "install", id])
            .timeout(self.limits.package_timeout())
            .output()
            .await
            .map_err(|e| classify_failure(e, id))?;
        self.installed_core(id).await
    }

    async fn uninstall_core(&self, id: &str) -> Result<()> {
        info!("🗑️  Uninstalling core {}", id);
        self.command()
            .await?
            .args(["core", "uninstall", id])
            .timeout(self.limits.package_timeout())
            .output()
            .await
            .map_err(|e| classify_failure(e, id))?;
        Ok(())
    }

    async fn search_libs(&self, query: &str) -> Result<Vec<LibraryDescriptor>> {
        let value = self
            .json(["lib", "search", query])
            .await
            .map_err(|e| classify_failure(e, query))?;
        Ok(parse_lib_search(&value))
    }

    async fn install_lib(&self, name: &str) -> Result<LibraryDescriptor> {
        info!("📦 Installing library {}", name);
        self.command()
            .await?
            .args(["lib", "install", name])
            .timeout(self.limits.package_timeout())
            .output()
            .await
            .map_err(|e| classify_failure(e, name))?;
        self.installed_lib(name).await
    }

    async fn uninstall_lib(&self, name: &str) -> Result<()> {
        info!("🗑️  Uninstalling library {}", name);
        self.command()
            .await?
            .args(["lib", "uninstall", name])
            .timeout(self.limits.package_timeout())
            .output()
            .await
            .map_err(|e| classify_failure(e, name))?;
        Ok(())
    }

    async fn compile(&self, ctx: &BuildContext, sink: LineSink) -> Result<()> {
        let fqbn = ctx.target.qualified_fqbn().ok_or_else(|| {
            FlasherError::Validation("Arduino builds need a board target".to_string())
        })?;
        let cmd = self
            .command()
            .await?
            .args(["compile", "--fqbn", fqbn.as_str()])
            .arg(Self::sketch_arg(ctx.project_dir()))
            .timeout(self.limits.compile_timeout());
        sink(&format!("🔨 Executing: {}", cmd.display()));
        cmd.run(Some(&sink)).await?;
        Ok(())
    }

    async fn upload(&self, ctx: &BuildContext, sink: LineSink) -> Result<()> {
        let fqbn = ctx.target.qualified_fqbn().ok_or_else(|| {
            FlasherError::Validation("Arduino uploads need a board target".to_string())
        })?;
        let port = ctx.port.as_deref().ok_or_else(|| {
            FlasherError::Validation("No serial port configured for upload".to_string())
        })?;
        let cmd = self
            .command()
            .await?
            .args(["upload", "--fqbn", fqbn.as_str(), "-p", port])
            .arg(Self::sketch_arg(ctx.project_dir()))
            .timeout(self.limits.upload_timeout());
        sink(&format!("🔥 Executing: {}", cmd.display()));
        cmd.run(Some(&sink)).await?;
        Ok(())
    }
}

fn parse_json(stdout: &str) -> Result<Value> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(trimmed)?)
}

fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Top-level array, or the array under `key` for newer CLI versions
fn items<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .as_array()
        .or_else(|| value.get(key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub(crate) fn parse_boards(value: &Value) -> Vec<BoardSummary> {
    let mut boards: Vec<BoardSummary> = items(value, "boards")
        .iter()
        .filter_map(|b| {
            Some(BoardSummary {
                name: str_field(b, &["name"])?,
                fqbn: str_field(b, &["fqbn"])?,
            })
        })
        .collect();
    boards.sort_by(|a, b| a.name.cmp(&b.name));
    boards
}

pub(crate) fn parse_board_options(value: &Value) -> Vec<ConfigOption> {
    items(value, "config_options")
        .iter()
        .filter_map(|o| {
            let name = str_field(o, &["option"])?;
            let label = str_field(o, &["option_label"]).unwrap_or_else(|| name.clone());
            let values = items(o, "values")
                .iter()
                .filter_map(|v| {
                    let value = str_field(v, &["value"])?;
                    Some(ConfigValue {
                        label: str_field(v, &["value_label"]).unwrap_or_else(|| value.clone()),
                        is_default: v.get("selected").and_then(Value::as_bool).unwrap_or(false),
                        value,
                    })
                })
                .collect();
            Some(ConfigOption {
                name,
                label,
                values,
            })
        })
        .collect()
}

pub(crate) fn parse_cores(value: &Value) -> Vec<CoreDescriptor> {
    items(value, "platforms")
        .iter()
        .filter_map(|p| {
            let id = str_field(p, &["id"])?;
            let installed = str_field(p, &["installed_version", "installed"]);
            let latest = str_field(p, &["latest_version", "latest"]);
            let name = str_field(p, &["name"])
                .or_else(|| {
                    let release = latest.as_deref().or(installed.as_deref())?;
                    p.get("releases")
                        .and_then(|r| r.get(release))
                        .and_then(|r| str_field(r, &["name"]))
                })
                .unwrap_or_else(|| id.clone());
            Some(CoreDescriptor {
                id,
                name,
                installed,
                latest,
            })
        })
        .collect()
}

pub(crate) fn parse_lib_search(value: &Value) -> Vec<LibraryDescriptor> {
    items(value, "libraries")
        .iter()
        .filter_map(|l| {
            let name = str_field(l, &["name"])?;
            let latest = l.get("latest").cloned().unwrap_or(Value::Null);
            Some(LibraryDescriptor {
                name,
                version: str_field(&latest, &["version"]),
                author: str_field(&latest, &["author"]),
                sentence: str_field(&latest, &["sentence"]),
            })
        })
        .collect()
}

pub(crate) fn parse_installed_libs(value: &Value) -> Vec<LibraryDescriptor> {
    items(value, "installed_libraries")
        .iter()
        .filter_map(|entry| {
            let lib = entry.get("library").unwrap_or(entry);
            Some(LibraryDescriptor {
                name: str_field(lib, &["name"])?,
                version: str_field(lib, &["version"]),
                author: str_field(lib, &["author"]),
                sentence: str_field(lib, &["sentence"]),
            })
        })
        .collect()
}
