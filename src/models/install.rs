//! Toolchain bootstrap job models

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::toolchain::ToolchainKind;

/// One step of a toolchain bootstrap stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallEvent {
    pub status_line: String,
    pub finished: bool,
    pub success: bool,
    /// Resolved executable, only on a successful final event
    pub resolved_path: Option<PathBuf>,
}

impl InstallEvent {
    pub fn line(line: impl Into<String>) -> Self {
        Self {
            status_line: line.into(),
            finished: false,
            success: false,
            resolved_path: None,
        }
    }

    pub fn finished(line: impl Into<String>, resolved_path: Option<PathBuf>) -> Self {
        Self {
            status_line: line.into(),
            finished: true,
            success: resolved_path.is_some(),
            resolved_path,
        }
    }
}

/// State of the most recent bootstrap for a toolchain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallJob {
    pub kind: ToolchainKind,
    pub running: bool,
    pub log: Vec<String>,
    pub success: Option<bool>,
    pub resolved_path: Option<PathBuf>,
}

impl InstallJob {
    pub fn started(kind: ToolchainKind) -> Self {
        Self {
            kind,
            running: true,
            log: Vec::new(),
            success: None,
            resolved_path: None,
        }
    }
}
