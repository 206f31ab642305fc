//! Toolchain bootstrap: installs the CLI binaries themselves

use log::{error, info};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::config::{BootstrapRecipe, FlasherConfig, InstallerSource};
use crate::errors::{FlasherError, Result};
use crate::events::ProgressPublisher;
use crate::models::{FlasherEvent, InstallEvent, InstallJob, ToolchainKind};
use crate::store::StateStore;
use crate::toolchain::{LineSink, ToolCommand};

/// Long-running, streamed installation of `arduino-cli` or PlatformIO Core.
///
/// At most one bootstrap per toolchain runs at a time. On success the resolved
/// executable is persisted and takes precedence over the configured path.
#[derive(Clone)]
pub struct ToolchainInstaller {
    inner: Arc<InstallerInner>,
}

struct InstallerInner {
    config: FlasherConfig,
    store: Arc<StateStore>,
    publisher: ProgressPublisher,
    http: reqwest::Client,
    jobs: Mutex<HashMap<ToolchainKind, InstallJob>>,
}

impl InstallerInner {
    fn jobs(&self) -> MutexGuard<'_, HashMap<ToolchainKind, InstallJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, kind: ToolchainKind, tx: &mpsc::UnboundedSender<InstallEvent>, event: InstallEvent) {
        if let Some(job) = self.jobs().get_mut(&kind) {
            job.log.push(event.status_line.clone());
            if event.finished {
                job.running = false;
                job.success = Some(event.success);
                job.resolved_path = event.resolved_path.clone();
            }
        }

        if event.finished {
            self.publisher.publish(FlasherEvent::InstallResult {
                kind,
                success: event.success,
                message: event.status_line.clone(),
                path: event.resolved_path.clone(),
            });
        } else {
            self.publisher.publish(FlasherEvent::InstallProgress {
                kind,
                line: event.status_line.clone(),
            });
        }
        // The caller may have dropped its receiver; the publisher still has the event
        let _ = tx.send(event);
    }
}

impl ToolchainInstaller {
    pub fn new(config: FlasherConfig, store: Arc<StateStore>, publisher: ProgressPublisher) -> Self {
        Self {
            inner: Arc::new(InstallerInner {
                config,
                store,
                publisher,
                http: reqwest::Client::new(),
                jobs: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start a bootstrap; events arrive on the returned stream and on the publisher
    pub fn install(&self, kind: ToolchainKind) -> Result<mpsc::UnboundedReceiver<InstallEvent>> {
        {
            let mut jobs = self.inner.jobs();
            if jobs.get(&kind).is_some_and(|job| job.running) {
                return Err(FlasherError::Busy(format!(
                    "{} installation already in progress",
                    kind.display_name()
                )));
            }
            jobs.insert(kind, InstallJob::started(kind));
        }

        info!("🔧 Starting {} installation", kind.display_name());
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let limit = inner.config.limits.install_timeout();
            let outcome = match tokio::time::timeout(limit, execute(&inner, kind, &tx)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FlasherError::timeout(format!(
                    "{} installation did not finish within {}s",
                    kind.display_name(),
                    limit.as_secs()
                ))),
            };
            let outcome = match outcome {
                Ok(path) => inner
                    .store
                    .set_cli_path(kind, path.clone())
                    .await
                    .map(|_| path),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(path) => {
                    info!("✅ {} installed at {}", kind.display_name(), path.display());
                    inner.emit(
                        kind,
                        &tx,
                        InstallEvent::finished(
                            format!("{} installed at {}", kind.display_name(), path.display()),
                            Some(path),
                        ),
                    );
                }
                Err(e) => {
                    error!("❌ {} installation failed: {}", kind.display_name(), e);
                    inner.emit(
                        kind,
                        &tx,
                        InstallEvent::finished(format!("Installation failed: {}", e), None),
                    );
                }
            }
        });
        Ok(rx)
    }

    /// Current or last bootstrap for `kind`
    pub fn status(&self, kind: ToolchainKind) -> Option<InstallJob> {
        self.inner.jobs().get(&kind).cloned()
    }

    pub fn is_running(&self, kind: ToolchainKind) -> bool {
        self.inner.jobs().get(&kind).is_some_and(|job| job.running)
    }
}

async fn execute(
    inner: &Arc<InstallerInner>,
    kind: ToolchainKind,
    tx: &mpsc::UnboundedSender<InstallEvent>,
) -> Result<PathBuf> {
    let recipe = inner.config.installer.recipe(kind).clone();
    let install_dir = inner.config.install_dir();
    tokio::fs::create_dir_all(&install_dir).await?;

    let script = match &recipe.source {
        InstallerSource::Path(path) => path.clone(),
        InstallerSource::Url(url) => {
            inner.emit(kind, tx, InstallEvent::line(format!("Downloading {}", url)));
            download(&inner.http, url, &install_dir.join(format!("{}-installer", kind))).await?
        }
    };

    let cmd = bootstrap_command(kind, &recipe, &script, &install_dir)
        .timeout(inner.config.limits.install_timeout())
        .max_error_lines(inner.config.limits.max_error_lines);
    inner.emit(kind, tx, InstallEvent::line(format!("Running {}", cmd.display())));

    let sink_inner = inner.clone();
    let sink_tx = tx.clone();
    let sink: LineSink = Arc::new(move |line: &str| {
        sink_inner.emit(kind, &sink_tx, InstallEvent::line(line));
    });
    cmd.run(Some(&sink)).await?;

    resolve_executable(kind, &install_dir.join(&recipe.executable))
}

fn bootstrap_command(
    kind: ToolchainKind,
    recipe: &BootstrapRecipe,
    script: &Path,
    install_dir: &Path,
) -> ToolCommand {
    let cmd = ToolCommand::new(&recipe.interpreter)
        .arg(script.display().to_string())
        .args(recipe.args.iter().cloned())
        .current_dir(install_dir);
    match kind {
        ToolchainKind::Arduino => cmd.env(
            "BINDIR",
            install_dir.join("arduino-cli").join("bin").display().to_string(),
        ),
        ToolchainKind::PlatformIO => cmd.env(
            "PLATFORMIO_CORE_DIR",
            install_dir.join("platformio").display().to_string(),
        ),
    }
}

async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<PathBuf> {
    let bytes = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    tokio::fs::write(dest, &bytes).await?;
    Ok(dest.to_path_buf())
}

fn resolve_executable(kind: ToolchainKind, expected: &Path) -> Result<PathBuf> {
    if expected.exists() {
        return Ok(expected.to_path_buf());
    }
    which::which(kind.default_binary()).map_err(|_| {
        FlasherError::Config(format!(
            "The installer finished but {} was not found at {}",
            kind.default_binary(),
            expected.display()
        ))
    })
}
