//! Firmware artifact routes
//!
//! Multipart uploads of a single file, or registration of a source tree the
//! upload collaborator already unpacked on disk.

use bytes::Buf;
use futures_util::TryStreamExt;
use log::{debug, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use warp::Filter;
use warp::reply::Response;

use super::{api_kind, error_reply, json_reply, with_engine};
use crate::artifacts::ArtifactStore;
use crate::engine::Engine;
use crate::errors::{FlasherError, Result};
use crate::models::ToolchainKind;

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

#[derive(Debug, Deserialize)]
struct RegisterPathRequest {
    path: PathBuf,
}

/// Create all artifact routes
pub fn create_artifact_routes(
    engine: Engine,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let max_length = engine.artifacts().max_bytes() + MULTIPART_OVERHEAD;

    let upload = api_kind()
        .and(warp::path("artifact"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::multipart::form().max_length(max_length))
        .and(with_engine(engine.clone()))
        .and_then(upload_handler);
    let register = api_kind()
        .and(warp::path("artifact"))
        .and(warp::path("path"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_engine(engine.clone()))
        .and_then(register_handler);
    let current = api_kind()
        .and(warp::path("artifact"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_engine(engine))
        .and_then(current_handler);

    upload.or(register).or(current)
}

async fn upload_handler(
    kind: ToolchainKind,
    form: warp::multipart::FormData,
    engine: Engine,
) -> std::result::Result<Response, warp::Rejection> {
    let incoming = engine
        .artifacts()
        .uploads_dir()
        .join("incoming")
        .join(uuid::Uuid::new_v4().to_string());

    let saved = match save_upload(form, &incoming).await {
        Ok(path) => path,
        Err(e) => return Ok(error_reply(&e)),
    };
    info!("📥 Received {} upload {}", kind, saved.display());

    // A PlatformIO upload is judged by the directory it landed in
    let source = match kind {
        ToolchainKind::Arduino => saved.clone(),
        ToolchainKind::PlatformIO => incoming.clone(),
    };
    let result = engine.artifacts().accept(kind, &source).await;
    if kind == ToolchainKind::Arduino || result.is_err() {
        if let Err(e) = tokio::fs::remove_dir_all(&incoming).await {
            debug!("Failed to clean up {}: {}", incoming.display(), e);
        }
    }
    Ok(json_reply(result))
}

async fn register_handler(
    kind: ToolchainKind,
    body: RegisterPathRequest,
    engine: Engine,
) -> std::result::Result<Response, warp::Rejection> {
    Ok(json_reply(engine.artifacts().accept(kind, &body.path).await))
}

async fn current_handler(
    kind: ToolchainKind,
    engine: Engine,
) -> std::result::Result<Response, warp::Rejection> {
    Ok(json_reply(Ok(engine.artifacts().current(kind).await)))
}

/// Write the `file` part into `dir`, returning its path
async fn save_upload(mut form: warp::multipart::FormData, dir: &Path) -> Result<PathBuf> {
    while let Some(part) = form
        .try_next()
        .await
        .map_err(|e| FlasherError::Validation(format!("Error reading multipart: {}", e)))?
    {
        if part.name() != "file" {
            continue;
        }
        let filename = part
            .filename()
            .and_then(|name| Path::new(name).file_name())
            .map(|name| name.to_string_lossy().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| FlasherError::Validation("The upload has no filename".to_string()))?;

        let data = part
            .stream()
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(chunk.chunk());
                Ok(acc)
            })
            .await
            .map_err(|e| FlasherError::Validation(format!("Error reading upload: {}", e)))?;

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(filename);
        tokio::fs::write(&path, data).await?;
        return Ok(path);
    }
    Err(FlasherError::Validation(
        "The file field is missing".to_string(),
    ))
}
