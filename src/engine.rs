//! Wires the engine's components together from one `FlasherConfig`

use log::info;
use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::RemoteAgentController;
use crate::artifacts::{ArtifactRegistry, ArtifactStore};
use crate::boards::BoardResolver;
use crate::config::FlasherConfig;
use crate::errors::{FlasherError, Result};
use crate::events::ProgressPublisher;
use crate::installer::ToolchainInstaller;
use crate::models::ToolchainKind;
use crate::orchestrator::{FlashOrchestrator, FlashPipeline, HookRunner, PipelineParts};
use crate::packages::PackageClient;
use crate::store::StateStore;
use crate::toolchain::{ArduinoCli, CliLocator, PlatformIoCli, Toolchain};

/// Per-toolchain components
struct Lane {
    toolchain: Arc<dyn Toolchain>,
    resolver: Arc<BoardResolver>,
    packages: Arc<PackageClient>,
}

/// The flashing engine: everything the request surface talks to
#[derive(Clone)]
pub struct Engine {
    config: Arc<FlasherConfig>,
    publisher: ProgressPublisher,
    state: Arc<StateStore>,
    artifacts: Arc<ArtifactRegistry>,
    lanes: Arc<HashMap<ToolchainKind, Lane>>,
    installer: ToolchainInstaller,
    agent: RemoteAgentController,
    orchestrator: FlashOrchestrator,
}

impl Engine {
    /// Engine driving the real `arduino-cli` and `pio` executables
    pub fn new(config: FlasherConfig) -> Result<Self> {
        let state = Arc::new(StateStore::open(config.state_file())?);
        let arduino = ArduinoCli::new(
            CliLocator::new(
                ToolchainKind::Arduino,
                config.arduino.cli_path.clone(),
                state.clone(),
            ),
            config.arduino.clone(),
            config.limits.clone(),
        );
        let platformio = PlatformIoCli::new(
            CliLocator::new(
                ToolchainKind::PlatformIO,
                config.platformio.cli_path.clone(),
                state.clone(),
            ),
            config.limits.clone(),
        );
        let toolchains: Vec<Arc<dyn Toolchain>> = vec![Arc::new(arduino), Arc::new(platformio)];
        Ok(Self::with_toolchains(config, state, toolchains))
    }

    /// Engine over caller-supplied toolchains, one per kind
    pub fn with_toolchains(
        config: FlasherConfig,
        state: Arc<StateStore>,
        toolchains: Vec<Arc<dyn Toolchain>>,
    ) -> Self {
        let publisher = ProgressPublisher::new(config.limits.event_buffer);
        let artifacts = Arc::new(ArtifactRegistry::new(
            config.uploads_dir(),
            config.limits.max_upload_bytes(),
        ));
        let artifact_store: Arc<dyn ArtifactStore> = artifacts.clone();

        let agent = RemoteAgentController::new(
            CliLocator::new(
                ToolchainKind::PlatformIO,
                config.platformio.cli_path.clone(),
                state.clone(),
            ),
            config.platformio.remote_agent.clone(),
            publisher.clone(),
        );

        let mut lanes = HashMap::new();
        let mut orchestrator = FlashOrchestrator::new();
        for toolchain in toolchains {
            let kind = toolchain.kind();
            let resolver = Arc::new(BoardResolver::new(
                toolchain.clone(),
                artifact_store.clone(),
                publisher.clone(),
            ));
            let packages = Arc::new(PackageClient::new(toolchain.clone(), resolver.clone()));
            let pipeline = FlashPipeline::new(PipelineParts {
                toolchain: toolchain.clone(),
                resolver: resolver.clone(),
                artifacts: artifact_store.clone(),
                state: state.clone(),
                publisher: publisher.clone(),
                hooks: HookRunner::new(config.hooks.clone(), config.limits.clone()),
                limits: config.limits.clone(),
                default_port: config.serial_port.clone(),
                agent: (kind == ToolchainKind::PlatformIO).then(|| agent.clone()),
            });
            orchestrator = orchestrator.with_pipeline(pipeline);
            info!("🧰 {} pipeline ready", kind.display_name());
            lanes.insert(
                kind,
                Lane {
                    toolchain,
                    resolver,
                    packages,
                },
            );
        }

        let installer = ToolchainInstaller::new(config.clone(), state.clone(), publisher.clone());

        Self {
            config: Arc::new(config),
            publisher,
            state,
            artifacts,
            lanes: Arc::new(lanes),
            installer,
            agent,
            orchestrator,
        }
    }

    fn lane(&self, kind: ToolchainKind) -> Result<&Lane> {
        self.lanes.get(&kind).ok_or_else(|| {
            FlasherError::Unsupported(format!("No {} pipeline is configured", kind.display_name()))
        })
    }

    pub fn config(&self) -> &FlasherConfig {
        &self.config
    }

    pub fn publisher(&self) -> &ProgressPublisher {
        &self.publisher
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn artifacts(&self) -> &Arc<ArtifactRegistry> {
        &self.artifacts
    }

    pub fn toolchain(&self, kind: ToolchainKind) -> Result<Arc<dyn Toolchain>> {
        Ok(self.lane(kind)?.toolchain.clone())
    }

    pub fn resolver(&self, kind: ToolchainKind) -> Result<Arc<BoardResolver>> {
        Ok(self.lane(kind)?.resolver.clone())
    }

    pub fn packages(&self, kind: ToolchainKind) -> Result<Arc<PackageClient>> {
        Ok(self.lane(kind)?.packages.clone())
    }

    pub fn installer(&self) -> &ToolchainInstaller {
        &self.installer
    }

    pub fn agent(&self) -> &RemoteAgentController {
        &self.agent
    }

    pub fn orchestrator(&self) -> &FlashOrchestrator {
        &self.orchestrator
    }
}
