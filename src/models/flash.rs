//! Flash job data models

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::board::Target;
use super::toolchain::ToolchainKind;
use crate::errors::ErrorKind;

/// Flash job state machine
///
/// `Idle -> Queued -> PreHook -> Building -> Uploading -> PostHook -> Succeeded`,
/// with `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashState {
    Idle,
    Queued,
    PreHook,
    Building,
    Uploading,
    PostHook,
    Succeeded,
    Failed,
}

impl FlashState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlashState::Succeeded | FlashState::Failed)
    }

    /// Step identifier carried by progress events
    pub fn step(&self) -> &'static str {
        match self {
            FlashState::Idle => "idle",
            FlashState::Queued => "queued",
            FlashState::PreHook => "pre_flash_hook",
            FlashState::Building => "building",
            FlashState::Uploading => "uploading",
            FlashState::PostHook => "post_flash_hook",
            FlashState::Succeeded => "succeeded",
            FlashState::Failed => "failed",
        }
    }

    /// Progress reported on entering the state. `Failed` keeps whatever was reached.
    pub fn entry_progress(&self) -> Option<u8> {
        match self {
            FlashState::Idle | FlashState::Queued => Some(0),
            FlashState::PreHook => Some(5),
            FlashState::Building => Some(10),
            FlashState::Uploading => Some(60),
            FlashState::PostHook => Some(90),
            FlashState::Succeeded => Some(100),
            FlashState::Failed => None,
        }
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: FlashState) -> bool {
        use FlashState::*;
        match (self, next) {
            (Succeeded | Failed, _) => false,
            (_, Failed) => true,
            (Idle, Queued) => true,
            (Queued, PreHook | Building) => true,
            (PreHook, Building) => true,
            (Building, Uploading) => true,
            (Uploading, PostHook | Succeeded) => true,
            (PostHook, Succeeded) => true,
            _ => false,
        }
    }
}

/// A flash request as accepted from the request surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashRequest {
    pub target: Target,
    /// Serial port override; falls back to the configured port
    #[serde(default)]
    pub port: Option<String>,
    /// Run the configured pre/post flash hooks
    #[serde(default = "default_true")]
    pub run_hooks: bool,
}

fn default_true() -> bool {
    true
}

impl FlashRequest {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            port: None,
            run_hooks: true,
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn without_hooks(mut self) -> Self {
        self.run_hooks = false;
        self
    }
}

/// Returned once a flash request has been accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub kind: ToolchainKind,
    pub started_at: DateTime<Local>,
    pub remote: bool,
}

/// Point-in-time copy of a flash job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashJobSnapshot {
    pub kind: ToolchainKind,
    pub target: Target,
    pub state: FlashState,
    pub step: String,
    pub progress: u8,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub remote: bool,
    pub success: Option<bool>,
    pub message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub error_output: Option<String>,
}

/// Answer to a "current status" pull for one toolchain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlashStatus {
    /// No job has run since start-up
    Idle,
    /// A job is in a non-terminal state
    Active { job: FlashJobSnapshot },
    /// The most recent job reached a terminal state
    Finished { job: FlashJobSnapshot },
    /// A job was in flight when the process last stopped; its outcome is unknown
    Stale { started_at: DateTime<Local> },
}

/// Last accepted target per toolchain, used to pre-populate the flash form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastFlashOptions {
    pub target: Target,
    #[serde(default)]
    pub port: Option<String>,
    pub accepted_at: DateTime<Local>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            FlashState::Idle,
            FlashState::Queued,
            FlashState::PreHook,
            FlashState::Building,
            FlashState::Uploading,
            FlashState::PostHook,
            FlashState::Succeeded,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        assert!(!FlashState::Failed.can_transition_to(FlashState::Queued));
        assert!(!FlashState::Succeeded.can_transition_to(FlashState::Failed));
        assert!(FlashState::Uploading.can_transition_to(FlashState::Failed));
        assert!(!FlashState::Queued.can_transition_to(FlashState::Succeeded));
    }

    #[test]
    fn test_entry_progress_is_non_decreasing() {
        let mut last = 0;
        for state in [
            FlashState::Queued,
            FlashState::PreHook,
            FlashState::Building,
            FlashState::Uploading,
            FlashState::PostHook,
            FlashState::Succeeded,
        ] {
            let p = state.entry_progress().unwrap();
            assert!(p >= last);
            last = p;
        }
        assert_eq!(last, 100);
    }
}
