//! `serve`: run the HTTP/WebSocket API

use anyhow::Result;
use log::info;

use super::load_config;
use crate::cli::args::Cli;
use crate::engine::Engine;
use crate::server::start_server;

pub async fn execute_serve_command(
    cli: &Cli,
    bind: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let mut config = load_config(cli)?;
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    info!("🚀 Starting {} {}", crate::APP_NAME, crate::VERSION);
    info!("📁 Data directory: {}", config.data_dir.display());

    let engine = Engine::new(config)?;
    start_server(engine).await
}
