//! Core and library management routes

use warp::Filter;
use warp::reply::Response;

use super::{api_kind, json_reply, with_engine};
use crate::engine::Engine;
use crate::models::{
    CoreRequest, CoreSearchResponse, LibRequest, LibSearchResponse, PackageActionResponse,
    SearchRequest, ToolchainKind,
};

/// Create all package-related routes
pub fn create_package_routes(
    engine: Engine,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let cores = api_kind().and(warp::path("cores"));
    let libs = api_kind().and(warp::path("libs"));

    let core_search = cores
        .clone()
        .and(warp::path("search"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(core_search_handler);
    let core_install = cores
        .clone()
        .and(warp::path("install"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(core_install_handler);
    let core_uninstall = cores
        .and(warp::path("uninstall"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(core_uninstall_handler);

    let lib_search = libs
        .clone()
        .and(warp::path("search"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(lib_search_handler);
    let lib_install = libs
        .clone()
        .and(warp::path("install"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(lib_install_handler);
    let lib_uninstall = libs
        .and(warp::path("uninstall"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine))
        .and_then(lib_uninstall_handler);

    core_search
        .or(core_install)
        .or(core_uninstall)
        .or(lib_search)
        .or(lib_install)
        .or(lib_uninstall)
}

async fn core_search_handler(
    kind: ToolchainKind,
    body: SearchRequest,
    engine: Engine,
) -> Result<Response, warp::Rejection> {
    let result = match engine.packages(kind) {
        Ok(packages) => packages
            .search_cores(&body.query)
            .await
            .map(|cores| CoreSearchResponse { cores }),
        Err(e) => Err(e),
    };
    Ok(json_reply(result))
}

async fn core_install_handler(
    kind: ToolchainKind,
    body: CoreRequest,
    engine: Engine,
) -> Result<Response, warp::Rejection> {
    let result = match engine.packages(kind) {
        Ok(packages) => packages
            .install_core(&body.core)
            .await
            .map(|core| PackageActionResponse { id: core.id }),
        Err(e) => Err(e),
    };
    Ok(json_reply(result))
}

async fn core_uninstall_handler(
    kind: ToolchainKind,
    body: CoreRequest,
    engine: Engine,
) -> Result<Response, warp::Rejection> {
    let result = match engine.packages(kind) {
        Ok(packages) => packages
            .uninstall_core(&body.core)
            .await
            .map(|()| PackageActionResponse { id: body.core }),
        Err(e) => Err(e),
    };
    Ok(json_reply(result))
}

async fn lib_search_handler(
    kind: ToolchainKind,
    body: SearchRequest,
    engine: Engine,
) -> Result<Response, warp::Rejection> {
    let result = match engine.packages(kind) {
        Ok(packages) => packages
            .search_libs(&body.query)
            .await
            .map(|libraries| LibSearchResponse { libraries }),
        Err(e) => Err(e),
    };
    Ok(json_reply(result))
}

async fn lib_install_handler(
    kind: ToolchainKind,
    body: LibRequest,
    engine: Engine,
) -> Result<Response, warp::Rejection> {
    let result = match engine.packages(kind) {
        Ok(packages) => packages
            .install_lib(&body.lib)
            .await
            .map(|lib| PackageActionResponse { id: lib.name }),
        Err(e) => Err(e),
    };
    Ok(json_reply(result))
}

async fn lib_uninstall_handler(
    kind: ToolchainKind,
    body: LibRequest,
    engine: Engine,
) -> Result<Response, warp::Rejection> {
    let result = match engine.packages(kind) {
        Ok(packages) => packages
            .uninstall_lib(&body.lib)
            .await
            .map(|()| PackageActionResponse { id: body.lib }),
        Err(e) => Err(e),
    };
    Ok(json_reply(result))
}
