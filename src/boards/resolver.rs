//! Cached board/environment listings and target validation

use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::artifacts::ArtifactStore;
use crate::errors::{FlasherError, Result};
use crate::events::ProgressPublisher;
use crate::models::{BoardSummary, ConfigOption, FlasherEvent, Target, ToolchainKind, core_of};
use crate::toolchain::Toolchain;

/// Enumerates boards (Arduino) or environments (PlatformIO) for one toolchain.
///
/// Listings are cached until a core install/uninstall or an explicit refresh.
pub struct BoardResolver {
    toolchain: Arc<dyn Toolchain>,
    artifacts: Arc<dyn ArtifactStore>,
    publisher: ProgressPublisher,
    boards: RwLock<Option<Vec<BoardSummary>>>,
    options: RwLock<HashMap<String, Vec<ConfigOption>>>,
    /// Keyed by artifact content id, so an edited `platformio.ini` is re-read
    environments: RwLock<Option<(String, Vec<String>)>>,
}

impl BoardResolver {
    pub fn new(
        toolchain: Arc<dyn Toolchain>,
        artifacts: Arc<dyn ArtifactStore>,
        publisher: ProgressPublisher,
    ) -> Self {
        Self {
            toolchain,
            artifacts,
            publisher,
            boards: RwLock::new(None),
            options: RwLock::new(HashMap::new()),
            environments: RwLock::new(None),
        }
    }

    pub fn kind(&self) -> ToolchainKind {
        self.toolchain.kind()
    }

    /// Every installable board, sorted by name
    pub async fn list_boards(&self) -> Result<Vec<BoardSummary>> {
        if let Some(boards) = self.boards.read().await.as_ref() {
            return Ok(boards.clone());
        }

        let mut cache = self.boards.write().await;
        if let Some(boards) = cache.as_ref() {
            return Ok(boards.clone());
        }
        let boards = self.toolchain.list_boards().await?;
        info!("📋 {} boards available for {}", boards.len(), self.kind());
        self.publisher.publish(FlasherEvent::BoardsAvailable {
            kind: self.kind(),
            count: boards.len(),
        });
        *cache = Some(boards.clone());
        Ok(boards)
    }

    /// Option schema of one board
    pub async fn board_options(&self, fqbn: &str) -> Result<Vec<ConfigOption>> {
        if !self.list_boards().await?.iter().any(|b| b.fqbn == fqbn) {
            return Err(FlasherError::UnknownBoard(fqbn.to_string()));
        }
        if let Some(options) = self.options.read().await.get(fqbn) {
            return Ok(options.clone());
        }

        let options = self.toolchain.board_options(fqbn).await?;
        debug!("{} has {} options", fqbn, options.len());
        self.options
            .write()
            .await
            .insert(fqbn.to_string(), options.clone());
        Ok(options)
    }

    /// Environments declared by the current artifact's `platformio.ini`
    pub async fn list_environments(&self) -> Result<Vec<String>> {
        let artifact = self.artifacts.current(self.kind()).await.ok_or_else(|| {
            FlasherError::Validation("No firmware has been uploaded yet".to_string())
        })?;

        if let Some((id, envs)) = self.environments.read().await.as_ref() {
            if *id == artifact.id {
                return Ok(envs.clone());
            }
        }

        let envs = self.toolchain.list_environments(&artifact.path).await?;
        info!("📋 {} environments in {}", envs.len(), artifact.path.display());
        self.publisher.publish(FlasherEvent::BoardsAvailable {
            kind: self.kind(),
            count: envs.len(),
        });
        *self.environments.write().await = Some((artifact.id.clone(), envs.clone()));
        Ok(envs)
    }

    /// Check `target` against the current snapshot.
    ///
    /// Every option name must belong to the board's current schema; a target
    /// naming an unknown option is stale.
    pub async fn resolve(&self, target: &Target) -> Result<()> {
        if target.kind() != self.kind() {
            return Err(FlasherError::Validation(format!(
                "A {} target cannot be flashed with {}",
                target.kind(),
                self.kind().display_name()
            )));
        }

        match target {
            Target::Board { fqbn, options } => {
                let boards = self.list_boards().await?;
                if !boards.iter().any(|b| &b.fqbn == fqbn) {
                    return Err(FlasherError::UnknownTarget(fqbn.clone()));
                }
                let schema = self.board_options(fqbn).await?;
                for option in options {
                    let Some(known) = schema.iter().find(|o| o.name == option.name) else {
                        return Err(FlasherError::UnknownTarget(format!(
                            "{} has no option '{}'",
                            fqbn, option.name
                        )));
                    };
                    if !known.values.iter().any(|v| v.value == option.value) {
                        return Err(FlasherError::UnknownTarget(format!(
                            "'{}' is not a valid value for {} option '{}'",
                            option.value, fqbn, option.name
                        )));
                    }
                }
                Ok(())
            }
            Target::Environment { name } => {
                let envs = self.list_environments().await?;
                if envs.iter().any(|e| e == name) {
                    Ok(())
                } else {
                    Err(FlasherError::UnknownTarget(name.clone()))
                }
            }
        }
    }

    /// Drop cached data derived from `core_id` after it was installed or removed
    pub async fn invalidate_core(&self, core_id: &str) {
        debug!("Invalidating board caches for core {}", core_id);
        *self.boards.write().await = None;
        self.options
            .write()
            .await
            .retain(|fqbn, _| core_of(fqbn) != core_id);
    }

    /// Forget everything, e.g. after a settings change
    pub async fn refresh(&self) {
        *self.boards.write().await = None;
        self.options.write().await.clear();
        *self.environments.write().await = None;
    }
}
