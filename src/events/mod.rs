//! Progress fan-out

pub mod publisher;

pub use publisher::ProgressPublisher;
