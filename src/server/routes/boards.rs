//! Board, environment and serial port listing routes

use warp::Filter;
use warp::reply::Response;

use super::{api_kind, json_reply, with_engine};
use crate::engine::Engine;
use crate::errors::FlasherError;
use crate::models::{
    AcceptedResponse, BoardDetailsRequest, BoardDetailsResponse, BoardListResponse,
    EnvironmentListResponse, ToolchainKind,
};
use crate::utils::serial::list_serial_ports;

/// Create all board-related routes
pub fn create_board_routes(
    engine: Engine,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let list = api_kind()
        .and(warp::path("boards"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_engine(engine.clone()))
        .and_then(list_boards_handler);
    let details = api_kind()
        .and(warp::path("boards"))
        .and(warp::path("details"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(board_details_handler);
    let refresh = api_kind()
        .and(warp::path("boards"))
        .and(warp::path("refresh"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_engine(engine.clone()))
        .and_then(refresh_handler);
    let environments = api_kind()
        .and(warp::path("environments"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_engine(engine))
        .and_then(environments_handler);
    let serial_ports = warp::path!("api" / "v1" / "serial-ports")
        .and(warp::get())
        .and_then(serial_ports_handler);

    serial_ports
        .or(list)
        .or(details)
        .or(refresh)
        .or(environments)
}

async fn list_boards_handler(
    kind: ToolchainKind,
    engine: Engine,
) -> Result<Response, warp::Rejection> {
    let result = match engine.resolver(kind) {
        Ok(resolver) => resolver
            .list_boards()
            .await
            .map(|boards| BoardListResponse { boards }),
        Err(e) => Err(e),
    };
    Ok(json_reply(result))
}

async fn board_details_handler(
    kind: ToolchainKind,
    body: BoardDetailsRequest,
    engine: Engine,
) -> Result<Response, warp::Rejection> {
    if body.fqbn.trim().is_empty() {
        return Ok(json_reply::<()>(Err(FlasherError::Validation(
            "The fqbn field is missing".to_string(),
        ))));
    }
    let result = match engine.resolver(kind) {
        Ok(resolver) => resolver
            .board_options(&body.fqbn)
            .await
            .map(|options| BoardDetailsResponse {
                fqbn: body.fqbn.clone(),
                options,
            }),
        Err(e) => Err(e),
    };
    Ok(json_reply(result))
}

async fn refresh_handler(kind: ToolchainKind, engine: Engine) -> Result<Response, warp::Rejection> {
    let result = match engine.resolver(kind) {
        Ok(resolver) => {
            resolver.refresh().await;
            Ok(AcceptedResponse {
                accepted: true,
                message: format!("{} listings will be refreshed on next access", kind),
            })
        }
        Err(e) => Err(e),
    };
    Ok(json_reply(result))
}

async fn environments_handler(
    kind: ToolchainKind,
    engine: Engine,
) -> Result<Response, warp::Rejection> {
    let result = match engine.resolver(kind) {
        Ok(resolver) => resolver
            .list_environments()
            .await
            .map(|environments| EnvironmentListResponse { environments }),
        Err(e) => Err(e),
    };
    Ok(json_reply(result))
}

async fn serial_ports_handler() -> Result<Response, warp::Rejection> {
    Ok(json_reply(list_serial_ports()))
}
