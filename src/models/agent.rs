//! Remote agent lifecycle

use serde::{Deserialize, Serialize};

/// Status of the supervised remote build agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteAgentStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl RemoteAgentStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, RemoteAgentStatus::Starting | RemoteAgentStatus::Running)
    }
}
