//! One toolchain's flash pipeline

use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::hooks::{HookPhase, HookRunner};
use super::job::FlashJob;
use crate::agent::RemoteAgentController;
use crate::artifacts::ArtifactStore;
use crate::boards::BoardResolver;
use crate::config::Limits;
use crate::errors::{FlasherError, Result};
use crate::events::ProgressPublisher;
use crate::models::{
    FlashRequest, FlashState, FlashStatus, FlasherEvent, JobHandle, ToolchainKind,
};
use crate::store::{LastOptionsStore, StateStore};
use crate::toolchain::{BuildContext, LineSink, Toolchain};

#[derive(Default)]
struct JobSlot {
    /// The live job, or the most recent one once terminal
    job: Option<FlashJob>,
}

/// Collaborators a pipeline is built from
pub struct PipelineParts {
    pub toolchain: Arc<dyn Toolchain>,
    pub resolver: Arc<BoardResolver>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub state: Arc<StateStore>,
    pub publisher: ProgressPublisher,
    pub hooks: HookRunner,
    pub limits: Limits,
    pub default_port: Option<String>,
    pub agent: Option<RemoteAgentController>,
}

/// Drives flash jobs for one `ToolchainKind`; at most one is live at a time
#[derive(Clone)]
pub struct FlashPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    kind: ToolchainKind,
    parts: PipelineParts,
    last_options: LastOptionsStore,
    slot: Mutex<JobSlot>,
}

impl FlashPipeline {
    pub fn new(parts: PipelineParts) -> Self {
        let kind = parts.toolchain.kind();
        let last_options = LastOptionsStore::new(parts.state.clone());
        Self {
            inner: Arc::new(PipelineInner {
                kind,
                parts,
                last_options,
                slot: Mutex::new(JobSlot::default()),
            }),
        }
    }

    pub fn kind(&self) -> ToolchainKind {
        self.inner.kind
    }

    pub fn last_options(&self) -> &LastOptionsStore {
        &self.inner.last_options
    }

    /// Validate and accept a flash request; the job runs in the background.
    ///
    /// Rejections create no job and emit no event. Target resolution may hit
    /// the toolchain, so it runs before the job slot is locked.
    pub async fn start(&self, request: FlashRequest) -> Result<JobHandle> {
        let inner = &self.inner;
        let kind = inner.kind;
        let parts = &inner.parts;

        let artifact = parts.artifacts.current(kind).await.ok_or_else(|| {
            FlasherError::Validation("no artifact".to_string())
        })?;

        if request.target.kind() != kind {
            return Err(FlasherError::Validation(format!(
                "The target does not belong to the {} pipeline",
                kind.display_name()
            )));
        }
        if self.is_busy().await {
            return Err(self.busy());
        }
        parts.resolver.resolve(&request.target).await?;

        let port = request.port.clone().or_else(|| parts.default_port.clone());
        if kind == ToolchainKind::Arduino && port.is_none() {
            return Err(FlasherError::Validation(
                "No serial port selected".to_string(),
            ));
        }

        let remote = match &parts.agent {
            Some(agent) => agent.is_enabled() && agent.is_running().await,
            None => false,
        };

        let mut slot = inner.slot.lock().await;
        // Another request may have been accepted while this one resolved
        if slot.job.as_ref().is_some_and(|job| !job.is_terminal()) {
            return Err(self.busy());
        }
        let job = FlashJob::queued(kind, request.target.clone(), remote);
        let handle = JobHandle {
            kind,
            started_at: job.started_at(),
            remote,
        };
        parts.publisher.publish(job.progress_event());
        slot.job = Some(job);
        drop(slot);

        info!(
            "⚡ Accepted {} flash of {} for {}{}",
            kind,
            artifact.file,
            request.target.name(),
            if remote { " via remote agent" } else { "" }
        );

        if let Err(e) = inner.last_options.record(kind, &request).await {
            warn!("Failed to store last {} flash options: {}", kind, e);
        }
        if let Err(e) = parts.state.mark_in_flight(kind, handle.started_at).await {
            warn!("Failed to record in-flight {} flash: {}", kind, e);
        }

        let ctx = BuildContext {
            artifact,
            target: request.target,
            port,
            remote,
        };
        let pipeline = self.clone();
        let run_hooks = request.run_hooks;
        tokio::spawn(async move {
            pipeline.run(ctx, run_hooks).await;
        });

        Ok(handle)
    }

    fn busy(&self) -> FlasherError {
        FlasherError::Busy(format!(
            "A {} flash is already running",
            self.inner.kind.display_name()
        ))
    }

    /// Current or most recent job, or `Stale` when a previous process died mid-job
    pub async fn status(&self) -> FlashStatus {
        let slot = self.inner.slot.lock().await;
        if let Some(job) = &slot.job {
            let snapshot = job.snapshot();
            return if job.is_terminal() {
                FlashStatus::Finished { job: snapshot }
            } else {
                FlashStatus::Active { job: snapshot }
            };
        }
        drop(slot);
        match self.inner.parts.state.in_flight(self.inner.kind).await {
            Some(started_at) => FlashStatus::Stale { started_at },
            None => FlashStatus::Idle,
        }
    }

    pub async fn is_busy(&self) -> bool {
        let slot = self.inner.slot.lock().await;
        slot.job.as_ref().is_some_and(|job| !job.is_terminal())
    }

    async fn run(&self, ctx: BuildContext, run_hooks: bool) {
        let kind = self.inner.kind;
        match self.steps(&ctx, run_hooks).await {
            Ok(()) => {
                info!("✅ {} flash of {} succeeded", kind, ctx.target.name());
                self.finish(|job| job.succeed("Flash successful")).await;
            }
            Err(e) => {
                error!("❌ {} flash of {} failed: {}", kind, ctx.target.name(), e);
                self.finish(|job| job.fail(&e)).await;
            }
        }
    }

    async fn steps(&self, ctx: &BuildContext, run_hooks: bool) -> Result<()> {
        let parts = &self.inner.parts;
        let sink = self.log_sink();

        if run_hooks && parts.hooks.is_configured(HookPhase::PreFlash) {
            self.advance(FlashState::PreHook).await;
            parts.hooks.run(HookPhase::PreFlash, &sink).await?;
        }

        self.advance(FlashState::Building).await;
        bounded(
            parts.limits.compile_timeout(),
            "Compilation",
            self.watch_agent(ctx, "Compilation", parts.toolchain.compile(ctx, sink.clone())),
        )
        .await?;

        self.advance(FlashState::Uploading).await;
        bounded(
            parts.limits.upload_timeout(),
            "Upload",
            self.watch_agent(ctx, "Upload", parts.toolchain.upload(ctx, sink.clone())),
        )
        .await?;

        if run_hooks && parts.hooks.is_configured(HookPhase::PostFlash) {
            self.advance(FlashState::PostHook).await;
            parts.hooks.run(HookPhase::PostFlash, &sink).await?;
        }
        Ok(())
    }

    /// Fail a delegated step as soon as the remote agent goes away
    async fn watch_agent<F>(&self, ctx: &BuildContext, what: &str, step: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        let agent = match &self.inner.parts.agent {
            Some(agent) if ctx.remote => agent,
            _ => return step.await,
        };
        let watch = agent.watch_status();
        tokio::select! {
            result = step => result,
            _ = RemoteAgentController::wait_for_loss(watch) => {
                Err(FlasherError::Agent(format!(
                    "The remote agent stopped during {}",
                    what.to_lowercase()
                )))
            }
        }
    }

    fn log_sink(&self) -> LineSink {
        let publisher = self.inner.parts.publisher.clone();
        let kind = self.inner.kind;
        Arc::new(move |line: &str| {
            publisher.publish(FlasherEvent::FlashLog {
                kind,
                line: line.to_string(),
            });
        })
    }

    async fn advance(&self, next: FlashState) {
        let mut slot = self.inner.slot.lock().await;
        if let Some(event) = slot.job.as_mut().and_then(|job| job.advance(next)) {
            info!("🔄 {} flash -> {}", self.inner.kind, next.step());
            self.inner.parts.publisher.publish(event);
        }
    }

    /// Apply the terminal transition, publish its events once, drop the in-flight marker
    async fn finish<F>(&self, terminal: F)
    where
        F: FnOnce(&mut FlashJob) -> Vec<FlasherEvent>,
    {
        let events = {
            let mut slot = self.inner.slot.lock().await;
            match slot.job.as_mut() {
                Some(job) => terminal(job),
                None => Vec::new(),
            }
        };
        for event in events {
            self.inner.parts.publisher.publish(event);
        }
        if let Err(e) = self.inner.parts.state.clear_in_flight(self.inner.kind).await {
            warn!("Failed to clear in-flight {} flash: {}", self.inner.kind, e);
        }
    }
}

/// Outer deadline for a step, on top of the subprocess runner's own
async fn bounded<F>(limit: Duration, what: &str, step: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    match tokio::time::timeout(limit, step).await {
        Ok(result) => result,
        Err(_) => Err(FlasherError::timeout(format!(
            "{} did not finish within {}s",
            what,
            limit.as_secs()
        ))),
    }
}
