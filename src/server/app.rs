//! Server application implementation

use anyhow::Result;
use log::{info, warn};
use std::net::SocketAddr;
use warp::Filter;

use crate::engine::Engine;
use crate::models::ToolchainKind;

/// Serves the engine over HTTP until Ctrl+C
pub struct ServerApp {
    engine: Engine,
}

impl ServerApp {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub async fn run(self) -> Result<()> {
        let settings = self.engine.config().server.clone();
        let bind_addr: SocketAddr = format!("{}:{}", settings.bind_address, settings.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))?;

        for kind in ToolchainKind::ALL {
            match self.engine.toolchain(kind) {
                Ok(toolchain) => match toolchain.check_setup().await {
                    Ok(()) => info!("✅ {} is ready", kind.display_name()),
                    Err(e) => warn!("⚠️ {}: {}", kind.display_name(), e),
                },
                Err(e) => warn!("⚠️ {}", e),
            }
        }

        let cors = warp::cors()
            .allow_any_origin()
            .allow_headers(vec!["content-type", "authorization"])
            .allow_methods(vec!["GET", "POST", "OPTIONS"]);
        let logging = super::middleware::with_request_logging();

        let routes = super::routes::create_routes(self.engine.clone())
            .recover(super::routes::handle_rejection)
            .with(logging)
            .with(cors);

        info!("🌍 Server listening on http://{}", bind_addr);
        info!("📄 API endpoints:");
        info!("   POST   /api/v1/arduino/flash                 - Start an Arduino flash");
        info!("   POST   /api/v1/platformio/flash              - Start a PlatformIO flash");
        info!("   GET    /api/v1/{{kind}}/flash/status          - Current flash job");
        info!("   GET    /api/v1/{{kind}}/last-options          - Last accepted flash options");
        info!("   POST   /api/v1/{{kind}}/artifact              - Upload firmware (multipart)");
        info!("   POST   /api/v1/{{kind}}/artifact/path         - Register an unpacked source tree");
        info!("   POST   /api/v1/{{kind}}/cores/{{search,install,uninstall}}");
        info!("   POST   /api/v1/{{kind}}/libs/{{search,install,uninstall}}");
        info!("   GET    /api/v1/{{kind}}/boards                - List boards");
        info!("   POST   /api/v1/{{kind}}/boards/details        - Board options");
        info!("   GET    /api/v1/{{kind}}/environments          - PlatformIO environments");
        info!("   POST   /api/v1/{{kind}}/toolchain/install     - Bootstrap the CLI");
        info!("   POST   /api/v1/platformio/agent/{{start,stop}} - Remote agent");
        info!("   GET    /api/v1/serial-ports                  - Serial ports");
        info!("   WS     /ws/events                            - Progress events");

        let agent = self.engine.agent().clone();
        let (_addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(bind_addr, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("ℹ️ Received shutdown signal (Ctrl+C)...");
            })
            .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", bind_addr, e))?;
        server.await;

        if let Err(e) = agent.stop().await {
            warn!("Failed to stop remote agent: {}", e);
        }
        info!("👋 Server stopped");
        Ok(())
    }
}
