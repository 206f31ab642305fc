//! Toolchain bootstrap and remote agent routes

use log::info;
use warp::Filter;
use warp::reply::Response;

use super::{accepted_reply, api_kind, json_reply, with_engine};
use crate::engine::Engine;
use crate::models::{AcceptedResponse, AgentStatusResponse, ToolchainKind, ToolchainStatusResponse};

/// Create toolchain and agent routes
pub fn create_toolchain_routes(
    engine: Engine,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let install = api_kind()
        .and(warp::path("toolchain"))
        .and(warp::path("install"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_engine(engine.clone()))
        .and_then(install_handler);
    let status = api_kind()
        .and(warp::path("toolchain"))
        .and(warp::path("status"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_engine(engine.clone()))
        .and_then(status_handler);

    let agent_start = warp::path!("api" / "v1" / "platformio" / "agent" / "start")
        .and(warp::post())
        .and(with_engine(engine.clone()))
        .and_then(agent_start_handler);
    let agent_stop = warp::path!("api" / "v1" / "platformio" / "agent" / "stop")
        .and(warp::post())
        .and(with_engine(engine.clone()))
        .and_then(agent_stop_handler);
    let agent_status = warp::path!("api" / "v1" / "platformio" / "agent" / "status")
        .and(warp::get())
        .and(with_engine(engine))
        .and_then(agent_status_handler);

    install
        .or(status)
        .or(agent_start)
        .or(agent_stop)
        .or(agent_status)
}

async fn install_handler(kind: ToolchainKind, engine: Engine) -> Result<Response, warp::Rejection> {
    info!("📥 Toolchain install request for {}", kind);
    // Progress is delivered through the publisher; the direct stream is not needed here
    let result = engine.installer().install(kind).map(|_events| AcceptedResponse {
        accepted: true,
        message: format!("Installing {}", kind.display_name()),
    });
    Ok(accepted_reply(result))
}

async fn status_handler(kind: ToolchainKind, engine: Engine) -> Result<Response, warp::Rejection> {
    let result = match engine.toolchain(kind) {
        Ok(toolchain) => {
            let setup = toolchain.check_setup().await;
            Ok(ToolchainStatusResponse {
                kind,
                ready: setup.is_ok(),
                setup_error: setup.err().map(|e| e.to_string()),
                cli_path: engine.state().cli_path(kind).await,
                install: engine.installer().status(kind),
            })
        }
        Err(e) => Err(e),
    };
    Ok(json_reply(result))
}

async fn agent_start_handler(engine: Engine) -> Result<Response, warp::Rejection> {
    let result = engine.agent().start().await.map(|()| AcceptedResponse {
        accepted: true,
        message: "Remote agent starting".to_string(),
    });
    Ok(accepted_reply(result))
}

async fn agent_stop_handler(engine: Engine) -> Result<Response, warp::Rejection> {
    let result = engine.agent().stop().await.map(|()| AcceptedResponse {
        accepted: true,
        message: "Remote agent stopping".to_string(),
    });
    Ok(accepted_reply(result))
}

async fn agent_status_handler(engine: Engine) -> Result<Response, warp::Rejection> {
    let agent = engine.agent();
    Ok(json_reply(Ok(AgentStatusResponse {
        enabled: agent.is_enabled(),
        status: agent.status().await,
    })))
}
