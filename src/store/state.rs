//! Small durable key-value record per toolchain, stored as RON

use chrono::{DateTime, Local};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::errors::Result;
use crate::models::{LastFlashOptions, ToolchainKind};

const STATE_VERSION: u32 = 1;

/// Everything that survives a restart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentState {
    /// Format version for compatibility
    pub version: u32,
    #[serde(default)]
    pub last_flash_options: HashMap<ToolchainKind, LastFlashOptions>,
    /// Executables resolved by the toolchain installer
    #[serde(default)]
    pub cli_paths: HashMap<ToolchainKind, PathBuf>,
    /// Jobs accepted but not yet terminal, keyed by start time
    #[serde(default)]
    pub in_flight: HashMap<ToolchainKind, DateTime<Local>>,
    pub last_updated: DateTime<Local>,
}

impl Default for PersistentState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            last_flash_options: HashMap::new(),
            cli_paths: HashMap::new(),
            in_flight: HashMap::new(),
            last_updated: Local::now(),
        }
    }
}

/// Persistent state with write-through to disk
#[derive(Debug)]
pub struct StateStore {
    path: Option<PathBuf>,
    state: RwLock<PersistentState>,
}

impl StateStore {
    /// Load from `path`, starting fresh when it is missing or unreadable
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let state = match Self::load(&path) {
            Ok(state) => {
                info!("💾 Loaded flasher state from {}", path.display());
                state
            }
            Err(e) => {
                if path.exists() {
                    warn!(
                        "⚠️ Failed to load state from {}: {}, starting fresh",
                        path.display(),
                        e
                    );
                }
                PersistentState::default()
            }
        };
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    /// Non-durable store, for embedding and tests
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(PersistentState::default()),
        }
    }

    fn load(path: &Path) -> Result<PersistentState> {
        let content = std::fs::read_to_string(path)?;
        let state: PersistentState = ron::from_str(&content)?;
        Ok(state)
    }

    fn save(&self, state: &mut PersistentState) -> Result<()> {
        state.last_updated = Local::now();
        let Some(path) = &self.path else {
            return Ok(());
        };
        let ron_string = ron::ser::to_string_pretty(&*state, ron::ser::PrettyConfig::default())?;
        let tmp = path.with_extension("ron.tmp");
        std::fs::write(&tmp, ron_string)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub async fn snapshot(&self) -> PersistentState {
        self.state.read().await.clone()
    }

    pub async fn last_flash_options(&self, kind: ToolchainKind) -> Option<LastFlashOptions> {
        self.state.read().await.last_flash_options.get(&kind).cloned()
    }

    pub async fn set_last_flash_options(
        &self,
        kind: ToolchainKind,
        options: LastFlashOptions,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.last_flash_options.insert(kind, options);
        self.save(&mut state)
    }

    pub async fn cli_path(&self, kind: ToolchainKind) -> Option<PathBuf> {
        self.state.read().await.cli_paths.get(&kind).cloned()
    }

    pub async fn set_cli_path(&self, kind: ToolchainKind, path: PathBuf) -> Result<()> {
        let mut state = self.state.write().await;
        state.cli_paths.insert(kind, path);
        self.save(&mut state)
    }

    pub async fn in_flight(&self, kind: ToolchainKind) -> Option<DateTime<Local>> {
        self.state.read().await.in_flight.get(&kind).copied()
    }

    pub async fn mark_in_flight(&self, kind: ToolchainKind, started_at: DateTime<Local>) -> Result<()> {
        let mut state = self.state.write().await;
        state.in_flight.insert(kind, started_at);
        self.save(&mut state)
    }

    pub async fn clear_in_flight(&self, kind: ToolchainKind) -> Result<()> {
        let mut state = self.state.write().await;
        if state.in_flight.remove(&kind).is_some() {
            self.save(&mut state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoardOption, Target};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.ron");

        let store = StateStore::open(&path).unwrap();
        let options = LastFlashOptions {
            target: Target::board("arduino:avr:mega", vec![BoardOption::new("cpu", "atmega2560")]),
            port: Some("/dev/ttyUSB0".into()),
            accepted_at: Local::now(),
        };
        store
            .set_last_flash_options(ToolchainKind::Arduino, options.clone())
            .await
            .unwrap();
        store
            .set_cli_path(ToolchainKind::PlatformIO, PathBuf::from("/opt/pio/bin/pio"))
            .await
            .unwrap();
        drop(store);

        let reopened = StateStore::open(&path).unwrap();
        assert_eq!(
            reopened.last_flash_options(ToolchainKind::Arduino).await,
            Some(options)
        );
        assert_eq!(reopened.last_flash_options(ToolchainKind::PlatformIO).await, None);
        assert_eq!(
            reopened.cli_path(ToolchainKind::PlatformIO).await,
            Some(PathBuf::from("/opt/pio/bin/pio"))
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.ron");
        std::fs::write(&path, "not ron at all (((").unwrap();

        let store = StateStore::open(&path).unwrap();
        assert!(store.snapshot().await.last_flash_options.is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_marker() {
        let store = StateStore::in_memory();
        let now = Local::now();
        store.mark_in_flight(ToolchainKind::Arduino, now).await.unwrap();
        assert_eq!(store.in_flight(ToolchainKind::Arduino).await, Some(now));
        store.clear_in_flight(ToolchainKind::Arduino).await.unwrap();
        assert_eq!(store.in_flight(ToolchainKind::Arduino).await, None);
    }
}
