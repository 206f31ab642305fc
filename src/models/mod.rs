//! Data models shared across the engine and its request surface

pub mod agent;
pub mod artifact;
pub mod board;
pub mod events;
pub mod flash;
pub mod install;
pub mod package;
pub mod responses;
pub mod toolchain;

// Re-export commonly used types
pub use agent::*;
pub use artifact::*;
pub use board::*;
pub use events::*;
pub use flash::*;
pub use install::*;
pub use package::*;
pub use responses::*;
pub use toolchain::*;
