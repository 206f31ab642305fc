//! Start/stop/monitor the PlatformIO remote agent process

use log::{error, info, warn};
use regex::Regex;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot, watch};

use crate::config::RemoteAgentSettings;
use crate::errors::{FlasherError, Result};
use crate::events::ProgressPublisher;
use crate::models::{FlasherEvent, RemoteAgentStatus};
use crate::toolchain::CliLocator;

struct AgentState {
    status: RemoteAgentStatus,
    stop_tx: Option<oneshot::Sender<()>>,
}

/// Supervises one `pio remote agent start` process.
///
/// Status moves `Stopped -> Starting -> Running -> Stopping -> Stopped`; the
/// `Starting -> Running` step waits for the agent's own confirmation line.
#[derive(Clone)]
pub struct RemoteAgentController {
    locator: CliLocator,
    settings: RemoteAgentSettings,
    publisher: ProgressPublisher,
    state: Arc<Mutex<AgentState>>,
    status_tx: Arc<watch::Sender<RemoteAgentStatus>>,
}

impl RemoteAgentController {
    pub fn new(
        locator: CliLocator,
        settings: RemoteAgentSettings,
        publisher: ProgressPublisher,
    ) -> Self {
        Self {
            locator,
            settings,
            publisher,
            state: Arc::new(Mutex::new(AgentState {
                status: RemoteAgentStatus::Stopped,
                stop_tx: None,
            })),
            status_tx: Arc::new(watch::channel(RemoteAgentStatus::Stopped).0),
        }
    }

    /// Whether flash jobs should be delegated to the agent
    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub async fn status(&self) -> RemoteAgentStatus {
        self.state.lock().await.status
    }

    pub async fn is_running(&self) -> bool {
        self.status().await == RemoteAgentStatus::Running
    }

    /// Latest status, updated on every transition
    pub fn watch_status(&self) -> watch::Receiver<RemoteAgentStatus> {
        self.status_tx.subscribe()
    }

    /// Resolves once the agent is stopping or stopped
    pub async fn wait_for_loss(mut watch: watch::Receiver<RemoteAgentStatus>) {
        loop {
            let status = *watch.borrow_and_update();
            if matches!(
                status,
                RemoteAgentStatus::Stopping | RemoteAgentStatus::Stopped
            ) {
                return;
            }
            if watch.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    fn set_status(&self, state: &mut AgentState, status: RemoteAgentStatus) {
        if state.status != status {
            info!("🛰️  Remote agent {:?} -> {:?}", state.status, status);
            state.status = status;
            self.status_tx.send_replace(status);
            self.publisher.publish(FlasherEvent::AgentStatus { status });
        }
    }

    fn log_line(&self, line: impl Into<String>) {
        self.publisher.publish(FlasherEvent::AgentLog { line: line.into() });
    }

    /// Start the agent; a no-op while it is already starting or running
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.status {
            RemoteAgentStatus::Starting | RemoteAgentStatus::Running => return Ok(()),
            RemoteAgentStatus::Stopping => {
                return Err(FlasherError::Busy(
                    "The remote agent is still stopping".to_string(),
                ));
            }
            RemoteAgentStatus::Stopped => {}
        }

        let ready = if self.settings.ready_pattern.is_empty() {
            None
        } else {
            Some(Regex::new(&self.settings.ready_pattern).map_err(|e| {
                FlasherError::Config(format!("Invalid remote agent ready pattern: {}", e))
            })?)
        };

        self.set_status(&mut state, RemoteAgentStatus::Starting);
        let mut child = match self.spawn().await {
            Ok(child) => child,
            Err(e) => {
                self.log_line(format!("Failed to start the remote agent: {}", e));
                self.set_status(&mut state, RemoteAgentStatus::Stopped);
                return Err(FlasherError::Agent(e.to_string()));
            }
        };

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, line_tx.clone());
        }
        drop(line_tx);

        if ready.is_none() {
            self.set_status(&mut state, RemoteAgentStatus::Running);
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        state.stop_tx = Some(stop_tx);
        drop(state);

        let controller = self.clone();
        tokio::spawn(async move {
            controller.supervise(child, line_rx, stop_rx, ready).await;
        });
        Ok(())
    }

    /// Ask the agent to stop; a no-op while it is already stopped
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.status {
            RemoteAgentStatus::Stopped | RemoteAgentStatus::Stopping => return Ok(()),
            RemoteAgentStatus::Starting | RemoteAgentStatus::Running => {}
        }
        self.set_status(&mut state, RemoteAgentStatus::Stopping);
        match state.stop_tx.take() {
            Some(stop_tx) => {
                // The supervisor confirms with the final transition to Stopped
                let _ = stop_tx.send(());
            }
            None => self.set_status(&mut state, RemoteAgentStatus::Stopped),
        }
        Ok(())
    }

    async fn spawn(&self) -> Result<Child> {
        let program = self.locator.resolve().await?;
        let mut command = Command::new(&program);
        command.args(["remote", "agent", "start"]);
        if let Some(name) = &self.settings.name {
            command.args(["-n", name]);
        }
        if let Some(token) = &self.settings.auth_token {
            command.env("PLATFORMIO_AUTH_TOKEN", token);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        info!("🛰️  Starting remote agent: {} remote agent start", program.display());
        Ok(command.spawn()?)
    }

    async fn supervise(
        &self,
        mut child: Child,
        mut lines: mpsc::UnboundedReceiver<String>,
        mut stop_rx: oneshot::Receiver<()>,
        ready: Option<Regex>,
    ) {
        let mut lines_open = true;
        let final_line = loop {
            tokio::select! {
                line = lines.recv(), if lines_open => match line {
                    Some(line) => {
                        if ready.as_ref().is_some_and(|re| re.is_match(&line)) {
                            let mut state = self.state.lock().await;
                            if state.status == RemoteAgentStatus::Starting {
                                self.set_status(&mut state, RemoteAgentStatus::Running);
                            }
                        }
                        self.log_line(line);
                    }
                    None => lines_open = false,
                },
                _ = &mut stop_rx => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill remote agent: {}", e);
                    }
                    break "Remote agent stopped".to_string();
                }
                status = child.wait() => {
                    // Flush whatever the agent printed before exiting
                    while let Ok(line) = lines.try_recv() {
                        self.log_line(line);
                    }
                    break match status {
                        Ok(status) => format!("Remote agent exited unexpectedly ({})", status),
                        Err(e) => format!("Lost track of the remote agent process: {}", e),
                    };
                }
            }
        };

        let mut state = self.state.lock().await;
        if final_line.starts_with("Remote agent stopped") {
            info!("🛑 {}", final_line);
        } else {
            error!("❌ {}", final_line);
        }
        self.log_line(final_line);
        state.stop_tx = None;
        self.set_status(&mut state, RemoteAgentStatus::Stopped);
    }
}

fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}
