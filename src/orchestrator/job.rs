//! The flash job record and its transitions

use chrono::{DateTime, Local};
use log::warn;

use crate::errors::{ErrorKind, FlasherError};
use crate::models::{FlashJobSnapshot, FlashState, FlasherEvent, Target, ToolchainKind};

/// One build+upload attempt, owned by its pipeline
#[derive(Debug, Clone)]
pub struct FlashJob {
    kind: ToolchainKind,
    target: Target,
    state: FlashState,
    progress: u8,
    started_at: DateTime<Local>,
    finished_at: Option<DateTime<Local>>,
    remote: bool,
    message: Option<String>,
    error: Option<(ErrorKind, Option<String>)>,
}

impl FlashJob {
    /// A freshly accepted job, already in `Queued` at 0%
    pub fn queued(kind: ToolchainKind, target: Target, remote: bool) -> Self {
        Self {
            kind,
            target,
            state: FlashState::Queued,
            progress: 0,
            started_at: Local::now(),
            finished_at: None,
            remote,
            message: None,
            error: None,
        }
    }

    pub fn state(&self) -> FlashState {
        self.state
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn remote(&self) -> bool {
        self.remote
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Event describing the current state
    pub fn progress_event(&self) -> FlasherEvent {
        FlasherEvent::FlashProgress {
            kind: self.kind,
            state: self.state,
            step: self.state.step().to_string(),
            progress: self.progress,
        }
    }

    /// Move to `next`, returning the event to publish.
    ///
    /// Progress never goes down within a job.
    pub fn advance(&mut self, next: FlashState) -> Option<FlasherEvent> {
        if !self.state.can_transition_to(next) {
            warn!(
                "Ignoring invalid {} flash transition {:?} -> {:?}",
                self.kind, self.state, next
            );
            return None;
        }
        self.state = next;
        if let Some(progress) = next.entry_progress() {
            self.progress = self.progress.max(progress).min(100);
        }
        if next.is_terminal() {
            self.finished_at = Some(Local::now());
        }
        Some(self.progress_event())
    }

    /// Terminal success; returns the progress and result events
    pub fn succeed(&mut self, message: impl Into<String>) -> Vec<FlasherEvent> {
        let mut events: Vec<_> = self.advance(FlashState::Succeeded).into_iter().collect();
        if !events.is_empty() {
            self.message = Some(message.into());
            events.push(self.result_event());
        }
        events
    }

    /// Terminal failure from whatever step was running
    pub fn fail(&mut self, err: &FlasherError) -> Vec<FlasherEvent> {
        let step = self.state.step();
        let mut events: Vec<_> = self.advance(FlashState::Failed).into_iter().collect();
        if !events.is_empty() {
            self.message = Some(format!("Flash failed during {}: {}", step, err));
            self.error = Some((err.kind(), err.stderr().map(str::to_string)));
            events.push(self.result_event());
        }
        events
    }

    fn result_event(&self) -> FlasherEvent {
        let (error_kind, error_output) = match &self.error {
            Some((kind, output)) => (Some(*kind), output.clone()),
            None => (None, None),
        };
        FlasherEvent::FlashResult {
            kind: self.kind,
            success: self.state == FlashState::Succeeded,
            message: self.message.clone().unwrap_or_default(),
            error_kind,
            error_output,
        }
    }

    pub fn snapshot(&self) -> FlashJobSnapshot {
        let (error_kind, error_output) = match &self.error {
            Some((kind, output)) => (Some(*kind), output.clone()),
            None => (None, None),
        };
        FlashJobSnapshot {
            kind: self.kind,
            target: self.target.clone(),
            state: self.state,
            step: self.state.step().to_string(),
            progress: self.progress,
            started_at: self.started_at,
            finished_at: self.finished_at,
            remote: self.remote,
            success: self.is_terminal().then_some(self.state == FlashState::Succeeded),
            message: self.message.clone(),
            error_kind,
            error_output,
        }
    }
}
