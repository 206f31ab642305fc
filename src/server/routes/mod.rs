//! HTTP routes for the flasher server

pub mod artifacts;
pub mod boards;
pub mod flash;
pub mod health;
pub mod packages;
pub mod toolchain;
pub mod websocket;

use log::{error, warn};
use serde::Serialize;
use std::convert::Infallible;
use warp::Filter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Reply;

use crate::engine::Engine;
use crate::errors::{ErrorKind, FlasherError, Result};
use crate::models::{ErrorResponse, ToolchainKind};

/// Create all server routes
pub fn create_routes(
    engine: Engine,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    flash::create_flash_routes(engine.clone())
        .or(packages::create_package_routes(engine.clone()))
        .or(boards::create_board_routes(engine.clone()))
        .or(toolchain::create_toolchain_routes(engine.clone()))
        .or(artifacts::create_artifact_routes(engine.clone()))
        .or(websocket::create_websocket_routes(engine))
        .or(health::create_health_route())
}

/// Helper function to pass the engine to handlers
pub(crate) fn with_engine(
    engine: Engine,
) -> impl Filter<Extract = (Engine,), Error = Infallible> + Clone {
    warp::any().map(move || engine.clone())
}

/// `/api/v1/<kind>` prefix
pub(crate) fn api_kind() -> impl Filter<Extract = (ToolchainKind,), Error = warp::Rejection> + Clone
{
    warp::path("api")
        .and(warp::path("v1"))
        .and(warp::path::param::<ToolchainKind>())
}

/// HTTP status for an error classification
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::UnknownTarget | ErrorKind::Serialization => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::Busy => StatusCode::CONFLICT,
        ErrorKind::NotFound | ErrorKind::UnknownBoard => StatusCode::NOT_FOUND,
        ErrorKind::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::Toolchain | ErrorKind::Network | ErrorKind::Agent => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Unsupported => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::Config | ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_reply(err: &FlasherError) -> Response {
    let status = status_for(err.kind());
    if status.is_server_error() {
        error!("❌ Request failed: {}", err);
    } else {
        warn!("⚠️ Request rejected: {}", err);
    }
    warp::reply::with_status(warp::reply::json(&ErrorResponse::from(err)), status).into_response()
}

/// JSON body on success, structured error otherwise
pub(crate) fn json_reply<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(body) => warp::reply::json(&body).into_response(),
        Err(e) => error_reply(&e),
    }
}

/// Like `json_reply`, answering `202 Accepted` on success
pub(crate) fn accepted_reply<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(body) => {
            warp::reply::with_status(warp::reply::json(&body), StatusCode::ACCEPTED).into_response()
        }
        Err(e) => error_reply(&e),
    }
}

/// Turn warp's own rejections into the same error body every handler uses
pub async fn handle_rejection(
    rejection: warp::Rejection,
) -> std::result::Result<Response, Infallible> {
    let (status, kind, message) = if rejection.is_not_found() {
        (
            StatusCode::NOT_FOUND,
            ErrorKind::NotFound,
            "Not found".to_string(),
        )
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::TooLarge,
            "The uploaded file is too large".to_string(),
        )
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, ErrorKind::Validation, e.to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::Validation,
            "Method not allowed".to_string(),
        )
    } else {
        error!("Unhandled rejection: {:?}", rejection);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Io,
            "Unhandled request error".to_string(),
        )
    };

    let body = ErrorResponse {
        error: message,
        kind,
        stderr: None,
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Busy), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::TooLarge), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(status_for(ErrorKind::Network), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
    }
}
