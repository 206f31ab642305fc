//! Flash endpoint routes

use log::info;
use warp::Filter;
use warp::reply::Response;

use super::{accepted_reply, api_kind, error_reply, json_reply, with_engine};
use crate::engine::Engine;
use crate::errors::FlasherError;
use crate::models::{
    ArduinoFlashBody, FlashRequest, PlatformIoFlashBody, Target, ToolchainKind,
};

/// Create all flash-related routes
pub fn create_flash_routes(
    engine: Engine,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    arduino_flash_route(engine.clone())
        .or(platformio_flash_route(engine.clone()))
        .or(flash_status_route(engine.clone()))
        .or(last_options_route(engine))
}

/// POST /api/v1/arduino/flash
fn arduino_flash_route(
    engine: Engine,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
    warp::path!("api" / "v1" / "arduino" / "flash")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine))
        .and_then(arduino_flash_handler)
}

/// POST /api/v1/platformio/flash
fn platformio_flash_route(
    engine: Engine,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
    warp::path!("api" / "v1" / "platformio" / "flash")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine))
        .and_then(platformio_flash_handler)
}

/// GET /api/v1/<kind>/flash/status
fn flash_status_route(
    engine: Engine,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
    api_kind()
        .and(warp::path("flash"))
        .and(warp::path("status"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_engine(engine))
        .and_then(flash_status_handler)
}

/// GET /api/v1/<kind>/last-options
fn last_options_route(
    engine: Engine,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone {
    api_kind()
        .and(warp::path("last-options"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_engine(engine))
        .and_then(last_options_handler)
}

fn flash_request(target: Target, port: Option<String>, skip_hooks: bool) -> FlashRequest {
    let mut request = FlashRequest::new(target);
    request.port = port.filter(|p| !p.trim().is_empty());
    if skip_hooks {
        request = request.without_hooks();
    }
    request
}

async fn arduino_flash_handler(
    body: ArduinoFlashBody,
    engine: Engine,
) -> Result<Response, warp::Rejection> {
    if body.fqbn.trim().is_empty() {
        return Ok(error_reply(&FlasherError::Validation(
            "The fqbn field is missing".to_string(),
        )));
    }
    info!("📥 Arduino flash request for {}", body.fqbn);
    let request = flash_request(
        Target::board(body.fqbn, body.options),
        body.port,
        body.skip_hooks,
    );
    Ok(accepted_reply(
        engine
            .orchestrator()
            .start_flash(ToolchainKind::Arduino, request)
            .await,
    ))
}

async fn platformio_flash_handler(
    body: PlatformIoFlashBody,
    engine: Engine,
) -> Result<Response, warp::Rejection> {
    if body.env.trim().is_empty() {
        return Ok(error_reply(&FlasherError::Validation(
            "The env field is missing".to_string(),
        )));
    }
    info!("📥 PlatformIO flash request for env {}", body.env);
    let request = flash_request(Target::environment(body.env), body.port, body.skip_hooks);
    Ok(accepted_reply(
        engine
            .orchestrator()
            .start_flash(ToolchainKind::PlatformIO, request)
            .await,
    ))
}

async fn flash_status_handler(
    kind: ToolchainKind,
    engine: Engine,
) -> Result<Response, warp::Rejection> {
    Ok(json_reply(engine.orchestrator().status(kind).await))
}

async fn last_options_handler(
    kind: ToolchainKind,
    engine: Engine,
) -> Result<Response, warp::Rejection> {
    Ok(json_reply(engine.orchestrator().last_options(kind).await))
}
