//! Firmware source artifacts

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::toolchain::ToolchainKind;

/// What shape of source tree an artifact is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Arduino sketch folder containing a `.ino` named after the folder
    Sketch,
    /// PlatformIO project directory containing `platformio.ini`
    PlatformIoProject,
}

/// Version information parsed post-hoc from the firmware sources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareMetadata {
    pub version: Option<String>,
    pub author: Option<String>,
}

/// A validated firmware source tree ready for building
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmwareArtifact {
    /// Content hash of the uploaded file
    pub id: String,
    pub toolchain: ToolchainKind,
    pub kind: ArtifactKind,
    /// Sketch folder or project directory handed to the toolchain
    pub path: PathBuf,
    /// The file inside `path` that identified the artifact
    pub file: String,
    pub uploaded_at: DateTime<Local>,
    pub metadata: Option<FirmwareMetadata>,
}
