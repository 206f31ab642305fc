//! Board and environment discovery

pub mod resolver;

pub use resolver::BoardResolver;
