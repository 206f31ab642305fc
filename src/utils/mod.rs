//! Utility modules

pub mod logging;
pub mod serial;
