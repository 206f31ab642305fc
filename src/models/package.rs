//! Package index descriptors

use serde::{Deserialize, Serialize};

/// A board platform ("core") from the package index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreDescriptor {
    pub id: String,
    pub name: String,
    /// Installed version, if any
    pub installed: Option<String>,
    pub latest: Option<String>,
}

/// A library from the library index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDescriptor {
    pub name: String,
    pub version: Option<String>,
    pub author: Option<String>,
    pub sentence: Option<String>,
}
