//! Marlin Flasher - firmware build and flash engine
//!
//! Turns a Marlin source tree into a flashed printer board through either
//! `arduino-cli` (board + per-option configuration) or PlatformIO (named build
//! environments, optionally through a remote agent), reporting live progress
//! to any number of subscribers.

pub mod agent;
pub mod artifacts;
pub mod boards;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod installer;
pub mod models;
pub mod orchestrator;
pub mod packages;
pub mod server;
pub mod store;
pub mod toolchain;
pub mod utils;

// Re-export commonly used types
pub use engine::Engine;
pub use errors::*;
pub use models::*;
pub use toolchain::{BuildContext, LineSink, Toolchain};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "marlin-flasher";
