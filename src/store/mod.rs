//! Durable per-toolchain records

pub mod last_options;
pub mod state;

pub use last_options::LastOptionsStore;
pub use state::{PersistentState, StateStore};
