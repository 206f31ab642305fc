//! Events pushed to progress subscribers

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::agent::RemoteAgentStatus;
use super::flash::FlashState;
use super::toolchain::ToolchainKind;
use crate::errors::ErrorKind;

/// Everything the engine reports asynchronously
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlasherEvent {
    /// Flash job state transition
    FlashProgress {
        kind: ToolchainKind,
        state: FlashState,
        step: String,
        progress: u8,
    },
    /// Output line from the compiler, uploader or a hook
    FlashLog { kind: ToolchainKind, line: String },
    /// Terminal flash outcome, published once per job
    FlashResult {
        kind: ToolchainKind,
        success: bool,
        message: String,
        error_kind: Option<ErrorKind>,
        error_output: Option<String>,
    },
    /// Toolchain bootstrap output line
    InstallProgress { kind: ToolchainKind, line: String },
    /// Toolchain bootstrap outcome
    InstallResult {
        kind: ToolchainKind,
        success: bool,
        message: String,
        path: Option<PathBuf>,
    },
    AgentStatus { status: RemoteAgentStatus },
    AgentLog { line: String },
    /// A fresh board or environment listing is available
    BoardsAvailable { kind: ToolchainKind, count: usize },
}

impl FlasherEvent {
    /// Toolchain the event concerns, if any
    pub fn kind(&self) -> Option<ToolchainKind> {
        match self {
            FlasherEvent::FlashProgress { kind, .. }
            | FlasherEvent::FlashLog { kind, .. }
            | FlasherEvent::FlashResult { kind, .. }
            | FlasherEvent::InstallProgress { kind, .. }
            | FlasherEvent::InstallResult { kind, .. }
            | FlasherEvent::BoardsAvailable { kind, .. } => Some(*kind),
            FlasherEvent::AgentStatus { .. } | FlasherEvent::AgentLog { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_are_tagged() {
        let event = FlasherEvent::FlashProgress {
            kind: ToolchainKind::Arduino,
            state: FlashState::Building,
            step: "building".into(),
            progress: 10,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "flash_progress");
        assert_eq!(value["kind"], "arduino");
        assert_eq!(value["state"], "building");

        let event = FlasherEvent::AgentStatus {
            status: RemoteAgentStatus::Running,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "agent_status");
        assert_eq!(value["status"], "running");
    }
}
