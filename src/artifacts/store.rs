//! Registry of the current firmware artifact per toolchain

use async_trait::async_trait;
use chrono::Local;
use log::info;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::metadata::parse_metadata;
use crate::errors::{FlasherError, Result};
use crate::models::{ArtifactKind, FirmwareArtifact, ToolchainKind};

/// Read access the orchestrator and resolvers need
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// The artifact the next flash for `kind` would build
    async fn current(&self, kind: ToolchainKind) -> Option<FirmwareArtifact>;
}

/// In-memory artifact store that validates and stages uploads
pub struct ArtifactRegistry {
    uploads_dir: PathBuf,
    max_bytes: u64,
    artifacts: RwLock<HashMap<ToolchainKind, FirmwareArtifact>>,
}

impl ArtifactRegistry {
    pub fn new(uploads_dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            max_bytes,
            artifacts: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    /// Validate `source` and make it the current artifact for `kind`.
    ///
    /// Arduino accepts a `.ino` file (staged into a sketch folder named after
    /// it) or a sketch folder. PlatformIO accepts a directory with a
    /// `platformio.ini` somewhere below it.
    pub async fn accept(&self, kind: ToolchainKind, source: &Path) -> Result<FirmwareArtifact> {
        if !source.exists() {
            return Err(FlasherError::Validation(format!(
                "Uploaded file {} does not exist",
                source.display()
            )));
        }
        let size = total_size(source)?;
        if size > self.max_bytes {
            return Err(FlasherError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        let id = content_id(source)?;
        let (artifact_kind, path, file) = match kind {
            ToolchainKind::Arduino => self.stage_sketch(source, &id)?,
            ToolchainKind::PlatformIO => locate_platformio_project(source)?,
        };

        let artifact = FirmwareArtifact {
            id,
            toolchain: kind,
            kind: artifact_kind,
            metadata: parse_metadata(&path),
            path,
            file,
            uploaded_at: Local::now(),
        };
        info!(
            "📁 Accepted {} artifact {} at {}",
            kind,
            artifact.file,
            artifact.path.display()
        );
        self.set(artifact.clone()).await;
        Ok(artifact)
    }

    /// Register an artifact prepared elsewhere
    pub async fn set(&self, artifact: FirmwareArtifact) {
        self.artifacts
            .write()
            .await
            .insert(artifact.toolchain, artifact);
    }

    pub async fn clear(&self, kind: ToolchainKind) {
        self.artifacts.write().await.remove(&kind);
    }

    fn stage_sketch(&self, source: &Path, id: &str) -> Result<(ArtifactKind, PathBuf, String)> {
        if source.is_file() {
            if source.extension().and_then(|e| e.to_str()) != Some("ino") {
                return Err(FlasherError::Validation("Invalid file type".to_string()));
            }
            let stem = source
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| FlasherError::Validation("Invalid sketch filename".to_string()))?;
            let sketch_dir = self.uploads_dir.join("arduino").join(id).join(stem);
            fs::create_dir_all(&sketch_dir)?;
            let file = format!("{}.ino", stem);
            fs::copy(source, sketch_dir.join(&file))?;
            return Ok((ArtifactKind::Sketch, sketch_dir, file));
        }

        let sketch = main_sketch(source)?;
        let dir = sketch
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| source.to_path_buf());
        let file = sketch
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok((ArtifactKind::Sketch, dir, file))
    }
}

#[async_trait]
impl ArtifactStore for ArtifactRegistry {
    async fn current(&self, kind: ToolchainKind) -> Option<FirmwareArtifact> {
        self.artifacts.read().await.get(&kind).cloned()
    }
}

fn glob_under(root: &Path, pattern: &str) -> Vec<PathBuf> {
    let full = root.join(pattern);
    match glob::glob(&full.to_string_lossy()) {
        Ok(paths) => paths.flatten().collect(),
        Err(_) => Vec::new(),
    }
}

/// The `.ino` whose stem matches its folder name, shallowest first
fn main_sketch(dir: &Path) -> Result<PathBuf> {
    let mut sketches = glob_under(dir, "**/*.ino");
    if sketches.is_empty() {
        return Err(FlasherError::Validation(
            "No Arduino sketch (.ino) was found in the given file".to_string(),
        ));
    }
    sketches.sort_by_key(|p| p.components().count());
    sketches
        .into_iter()
        .find(|sketch| {
            let stem = sketch.file_stem().and_then(|s| s.to_str());
            let folder = sketch
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str());
            stem.is_some() && stem == folder
        })
        .ok_or_else(|| {
            FlasherError::Validation(
                "The sketch file must be named after its folder".to_string(),
            )
        })
}

fn locate_platformio_project(source: &Path) -> Result<(ArtifactKind, PathBuf, String)> {
    if !source.is_dir() {
        return Err(FlasherError::Validation("Invalid file type".to_string()));
    }
    let mut configs = glob_under(source, "**/platformio.ini");
    configs.sort_by_key(|p| p.components().count());
    let config = configs.into_iter().next().ok_or_else(|| {
        FlasherError::Validation(
            "No Platform.io configuration file were found in the given file".to_string(),
        )
    })?;
    let dir = config
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| source.to_path_buf());
    Ok((
        ArtifactKind::PlatformIoProject,
        dir,
        "platformio.ini".to_string(),
    ))
}

fn total_size(path: &Path) -> Result<u64> {
    if path.is_file() {
        return Ok(fs::metadata(path)?.len());
    }
    Ok(glob_under(path, "**/*")
        .iter()
        .filter_map(|p| fs::metadata(p).ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum())
}

/// SHA-256 over the file, or over every relative path and file in a directory
fn content_id(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    if path.is_file() {
        hasher.update(fs::read(path)?);
    } else {
        let mut files: Vec<PathBuf> = glob_under(path, "**/*")
            .into_iter()
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        for file in files {
            if let Ok(relative) = file.strip_prefix(path) {
                hasher.update(relative.to_string_lossy().as_bytes());
            }
            hasher.update(fs::read(&file)?);
        }
    }
    let digest = hasher.finalize();
    Ok(digest.iter().take(8).map(|b| format!("{:02x}", b)).collect())
}
