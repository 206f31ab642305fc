//! Toolchain integrations
//!
//! The `Toolchain` trait is the seam between the engine and the CLI binaries.
//! `ArduinoCli` and `PlatformIoCli` drive the real executables; tests plug in
//! their own implementations.

pub mod arduino;
pub mod platformio;
pub mod process;

pub use arduino::ArduinoCli;
pub use platformio::PlatformIoCli;
pub use process::{BoundedLines, ProcessOutput, ToolCommand};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{FlasherError, Result};
use crate::models::{
    BoardSummary, ConfigOption, CoreDescriptor, FirmwareArtifact, LibraryDescriptor, Target,
    ToolchainKind,
};
use crate::store::StateStore;

/// Receives subprocess output line by line
pub type LineSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Everything a build or upload step needs
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub artifact: FirmwareArtifact,
    pub target: Target,
    pub port: Option<String>,
    /// Run through the remote agent instead of locally
    pub remote: bool,
}

impl BuildContext {
    pub fn project_dir(&self) -> &Path {
        &self.artifact.path
    }
}

fn unsupported(kind: ToolchainKind, what: &str) -> FlasherError {
    FlasherError::Unsupported(format!(
        "{} is not supported by the {} pipeline",
        what,
        kind.display_name()
    ))
}

/// Operations the engine needs from a toolchain binary
#[async_trait]
pub trait Toolchain: Send + Sync {
    fn kind(&self) -> ToolchainKind;

    /// Verify the configured executable exists and is the expected tool
    async fn check_setup(&self) -> Result<()>;

    async fn list_boards(&self) -> Result<Vec<BoardSummary>> {
        Err(unsupported(self.kind(), "Listing boards"))
    }

    async fn board_options(&self, _fqbn: &str) -> Result<Vec<ConfigOption>> {
        Err(unsupported(self.kind(), "Board details"))
    }

    async fn list_environments(&self, _project_dir: &Path) -> Result<Vec<String>> {
        Err(unsupported(self.kind(), "Listing environments"))
    }

    async fn search_cores(&self, _query: &str) -> Result<Vec<CoreDescriptor>> {
        Err(unsupported(self.kind(), "Core search"))
    }

    async fn install_core(&self, _id: &str) -> Result<CoreDescriptor> {
        Err(unsupported(self.kind(), "Core install"))
    }

    async fn uninstall_core(&self, _id: &str) -> Result<()> {
        Err(unsupported(self.kind(), "Core uninstall"))
    }

    async fn search_libs(&self, _query: &str) -> Result<Vec<LibraryDescriptor>> {
        Err(unsupported(self.kind(), "Library search"))
    }

    async fn install_lib(&self, _name: &str) -> Result<LibraryDescriptor> {
        Err(unsupported(self.kind(), "Library install"))
    }

    async fn uninstall_lib(&self, _name: &str) -> Result<()> {
        Err(unsupported(self.kind(), "Library uninstall"))
    }

    /// Compile the artifact for the target
    async fn compile(&self, ctx: &BuildContext, sink: LineSink) -> Result<()>;

    /// Write the compiled firmware to the device
    async fn upload(&self, ctx: &BuildContext, sink: LineSink) -> Result<()>;
}

/// Finds the executable for a toolchain.
///
/// A path persisted by the installer wins over the configured one; PATH is
/// searched last.
#[derive(Clone)]
pub struct CliLocator {
    kind: ToolchainKind,
    configured: Option<PathBuf>,
    store: Arc<StateStore>,
}

impl CliLocator {
    pub fn new(kind: ToolchainKind, configured: Option<PathBuf>, store: Arc<StateStore>) -> Self {
        Self {
            kind,
            configured,
            store,
        }
    }

    pub fn kind(&self) -> ToolchainKind {
        self.kind
    }

    pub async fn resolve(&self) -> Result<PathBuf> {
        if let Some(path) = self.store.cli_path(self.kind).await {
            return Ok(path);
        }
        if let Some(path) = &self.configured {
            return Ok(path.clone());
        }
        let candidates: &[&str] = match self.kind {
            ToolchainKind::Arduino => &["arduino-cli"],
            ToolchainKind::PlatformIO => &["pio", "platformio"],
        };
        candidates
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| {
                FlasherError::Config(format!(
                    "No path has been configured for {}, check the settings",
                    self.kind.display_name()
                ))
            })
    }
}

/// Narrow a failed package/board command down to a more precise error kind
pub(crate) fn classify_failure(err: FlasherError, subject: &str) -> FlasherError {
    const NETWORK_MARKERS: [&str; 8] = [
        "no such host",
        "dial tcp",
        "connection refused",
        "network is unreachable",
        "temporary failure in name resolution",
        "could not resolve host",
        "tls handshake",
        "i/o timeout",
    ];

    match err {
        FlasherError::Toolchain { message, stderr } => {
            let lower = stderr.to_lowercase();
            if NETWORK_MARKERS.iter().any(|m| lower.contains(m)) {
                let detail = stderr.lines().last().unwrap_or(&message).to_string();
                FlasherError::Network(detail)
            } else if lower.contains("not found")
                || lower.contains("unknown fqbn")
                || lower.contains("invalid fqbn")
                || lower.contains("no valid dependencies")
                || lower.contains("not installed")
            {
                FlasherError::NotFound(subject.to_string())
            } else {
                FlasherError::Toolchain { message, stderr }
            }
        }
        other => other,
    }
}
