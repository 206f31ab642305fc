//! Error taxonomy shared by every component

pub mod types;

pub use types::*;
