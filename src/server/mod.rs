//! HTTP/WebSocket request surface
//!
//! JSON endpoints under `/api/v1/<kind>/...` plus `/ws/events`, which streams
//! every engine event.

pub mod app;
pub mod middleware;
pub mod routes;

pub use app::ServerApp;

use anyhow::Result;

use crate::engine::Engine;

/// Start the flasher server and block until shutdown
pub async fn start_server(engine: Engine) -> Result<()> {
    ServerApp::new(engine).run().await
}
