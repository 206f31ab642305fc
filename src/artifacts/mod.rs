//! Firmware artifacts handed to the engine by the upload collaborator

pub mod metadata;
pub mod store;

pub use metadata::parse_metadata;
pub use store::{ArtifactRegistry, ArtifactStore};
