//! Bounded, time-limited subprocess execution with line streaming

use log::{debug, warn};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use super::LineSink;
use crate::errors::{FlasherError, Result};

/// Keeps the newest `cap` lines, dropping the oldest
#[derive(Debug, Clone)]
pub struct BoundedLines {
    cap: usize,
    lines: VecDeque<String>,
    dropped: usize,
}

impl BoundedLines {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            lines: VecDeque::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.cap {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(line.into());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of lines discarded so far
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn joined(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// Output of a successful run
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Empty unless stdout capture was requested
    pub stdout: String,
    /// Bounded tail of standard error
    pub stderr: String,
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// A toolchain invocation
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
    timeout: Duration,
    max_error_lines: usize,
    capture_stdout: bool,
    label: String,
}

impl ToolCommand {
    pub fn new(program: impl AsRef<Path>) -> Self {
        let program = program.as_ref().to_path_buf();
        let label = program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| program.display().to_string());
        Self {
            program,
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            timeout: Duration::from_secs(300),
            max_error_lines: 200,
            capture_stdout: false,
            label,
        }
    }

    /// Run `script` through `sh -c`
    pub fn shell(script: &str) -> Self {
        let mut cmd = Self::new("sh");
        cmd.args = vec!["-c".to_string(), script.to_string()];
        cmd.label = script.to_string();
        cmd
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_error_lines(mut self, lines: usize) -> Self {
        self.max_error_lines = lines;
        self
    }

    /// Keep stdout in the returned output; streamed build steps leave it off
    pub fn capture_stdout(mut self, capture: bool) -> Self {
        self.capture_stdout = capture;
        self
    }

    /// Human readable command line, for logs
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    /// Run without streaming, capturing stdout
    pub async fn output(&self) -> Result<ProcessOutput> {
        self.execute(None, true).await
    }

    /// Run to completion, forwarding every output line to `sink`.
    ///
    /// Non-zero exit becomes `FlasherError::Toolchain` carrying the bounded
    /// stderr tail; exceeding the timeout kills the child and returns `Timeout`
    /// with the stderr collected up to that point.
    pub async fn run(&self, sink: Option<&LineSink>) -> Result<ProcessOutput> {
        self.execute(sink, self.capture_stdout).await
    }

    async fn execute(&self, sink: Option<&LineSink>, capture_stdout: bool) -> Result<ProcessOutput> {
        debug!("Executing: {}", self.display());

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &self.envs {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FlasherError::Config(format!(
                "The given executable does not exist: {}",
                self.program.display()
            )),
            _ => FlasherError::Io(e),
        })?;

        let (tx, mut rx) = mpsc::unbounded_channel::<(Stream, String)>();
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, Stream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, Stream::Stderr, tx.clone());
        }
        drop(tx);

        let mut stdout = String::new();
        let mut stderr = BoundedLines::new(self.max_error_lines);
        let collect = async {
            while let Some((stream, line)) = rx.recv().await {
                if let Some(sink) = sink {
                    sink(&line);
                }
                match stream {
                    Stream::Stdout if capture_stdout => {
                        stdout.push_str(&line);
                        stdout.push('\n');
                    }
                    Stream::Stdout => {}
                    Stream::Stderr => stderr.push(line),
                }
            }
            child.wait().await
        };
        let outcome = tokio::time::timeout(self.timeout, collect).await;

        let status = match outcome {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    "{} exceeded {}s, killing it",
                    self.label,
                    self.timeout.as_secs()
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", self.label, e);
                }
                return Err(FlasherError::Timeout {
                    message: format!(
                        "{} did not finish within {}s",
                        self.label,
                        self.timeout.as_secs()
                    ),
                    stderr: stderr.joined(),
                });
            }
        };

        if stderr.dropped() > 0 {
            debug!(
                "{}: dropped {} oldest stderr lines",
                self.label,
                stderr.dropped()
            );
        }

        if status.success() {
            Ok(ProcessOutput {
                stdout,
                stderr: stderr.joined(),
            })
        } else {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            Err(FlasherError::toolchain(
                format!("{} exited with code {}", self.label, code),
                stderr.joined(),
            ))
        }
    }
}

fn spawn_reader<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer).trim_end().to_string();
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Stopped reading {:?}: {}", stream, e);
                    break;
                }
            }
        }
    });
}
