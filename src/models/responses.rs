//! Request and response bodies of the request surface

use serde::{Deserialize, Serialize};

use std::path::PathBuf;

use super::agent::RemoteAgentStatus;
use super::board::{BoardOption, BoardSummary, ConfigOption};
use super::install::InstallJob;
use super::package::{CoreDescriptor, LibraryDescriptor};
use super::toolchain::ToolchainKind;
use crate::errors::{ErrorKind, FlasherError};

/// Structured error returned by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl From<&FlasherError> for ErrorResponse {
    fn from(err: &FlasherError) -> Self {
        Self {
            error: err.message(),
            kind: err.kind(),
            stderr: err.stderr().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoreRequest {
    pub core: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibRequest {
    pub lib: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardDetailsRequest {
    pub fqbn: String,
}

/// Arduino flash request body
#[derive(Debug, Clone, Deserialize)]
pub struct ArduinoFlashBody {
    pub fqbn: String,
    #[serde(default)]
    pub options: Vec<BoardOption>,
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub skip_hooks: bool,
}

/// PlatformIO flash request body
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformIoFlashBody {
    pub env: String,
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub skip_hooks: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoreSearchResponse {
    pub cores: Vec<CoreDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibSearchResponse {
    pub libraries: Vec<LibraryDescriptor>,
}

/// Acknowledges an install/uninstall by echoing the acted-upon identifier
#[derive(Debug, Clone, Serialize)]
pub struct PackageActionResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardListResponse {
    pub boards: Vec<BoardSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardDetailsResponse {
    pub fqbn: String,
    pub options: Vec<ConfigOption>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentListResponse {
    pub environments: Vec<String>,
}

/// Generic acknowledgement for asynchronous operations
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
    pub message: String,
}

/// Toolchain health plus the most recent bootstrap
#[derive(Debug, Clone, Serialize)]
pub struct ToolchainStatusResponse {
    pub kind: ToolchainKind,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,
    pub cli_path: Option<PathBuf>,
    pub install: Option<InstallJob>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatusResponse {
    pub enabled: bool,
    pub status: RemoteAgentStatus,
}
