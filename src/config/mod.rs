//! Configuration management for the flasher

pub mod app_config;

pub use app_config::*;
