//! Remote build agent supervision

pub mod controller;

pub use controller::RemoteAgentController;
