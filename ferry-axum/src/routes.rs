use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing, Json, Router,
};
use chrono::{DateTime, Utc};
use ferry_bundle::{BundleCode, FileRef, UploadId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::upload::{receive_chunk, receive_file};
use crate::{FerryAxumError, FerryState};

/// Bytes buffered between the archive writer and the response body
const DOWNLOAD_PIPE_BYTES: usize = 64 * 1024;

/// What clients see of an attached file
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileView {
    pub id: String,
    pub name: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl From<&FileRef> for FileView {
    fn from(file: &FileRef) -> Self {
        Self {
            id: file.id.to_string(),
            name: file.display_name.clone(),
            size_bytes: file.size_bytes,
            created_at: file.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeRequest {
    upload_id: String,
}

/// Bundle routes, meant to be nested under `/api/files`
pub fn file_router(state: FerryState) -> Router<()> {
    Router::new()
        .route("/create_bundle", routing::post(create_bundle))
        .route("/upload_single_file/{otp}", routing::post(upload_single_file))
        .route("/chunked_upload/{otp}", routing::post(chunked_upload))
        .route("/chunked_upload/{otp}/{upload_id}", routing::delete(abandon_upload))
        .route("/finalize_upload/{otp}", routing::post(finalize_upload))
        .route("/bundle/{otp}", routing::get(resolve_bundle))
        .route("/download/{otp}", routing::get(download))
        .with_state(state)
}

async fn create_bundle(State(state): State<FerryState>) -> Result<Json<Value>, FerryAxumError> {
    let bundle = state.ferry.create_bundle().await?;
    Ok(Json(json!({
        "otp": bundle.code,
        "expiresAt": bundle.expires_at,
    })))
}

async fn upload_single_file(
    State(state): State<FerryState>,
    Path(otp): Path<String>,
    multipart: Multipart,
) -> Result<Json<Value>, FerryAxumError> {
    let code = BundleCode::parse(&otp)?;
    let file = receive_file(&state.ferry, &code, multipart).await?;
    Ok(Json(json!({
        "message": "File uploaded successfully",
        "file": FileView::from(&file),
    })))
}

async fn chunked_upload(
    State(state): State<FerryState>,
    Path(otp): Path<String>,
    multipart: Multipart,
) -> Result<Json<Value>, FerryAxumError> {
    let code = BundleCode::parse(&otp)?;
    let receipt = receive_chunk(&state.ferry, &code, multipart).await?;
    Ok(Json(json!({
        "message": "Chunk uploaded successfully",
        "receipt": receipt,
    })))
}

async fn finalize_upload(
    State(state): State<FerryState>,
    Path(otp): Path<String>,
    body: Result<Json<FinalizeRequest>, JsonRejection>,
) -> Result<Json<Value>, FerryAxumError> {
    let code = BundleCode::parse(&otp)?;
    let Json(request) = body?;
    let upload_id = UploadId::parse(&request.upload_id)?;

    let file = state.ferry.finalize_upload(&code, &upload_id).await?;
    Ok(Json(json!({
        "message": "Upload finalized successfully",
        "file": FileView::from(&file),
    })))
}

async fn abandon_upload(
    State(state): State<FerryState>,
    Path((otp, upload_id)): Path<(String, String)>,
) -> Result<Json<Value>, FerryAxumError> {
    let code = BundleCode::parse(&otp)?;
    let upload_id = UploadId::parse(&upload_id)?;

    let removed = state.ferry.abandon_upload(&code, &upload_id).await?;
    Ok(Json(json!({
        "message": "Upload abandoned",
        "chunksRemoved": removed,
    })))
}

async fn resolve_bundle(
    State(state): State<FerryState>,
    Path(otp): Path<String>,
) -> Result<Json<Value>, FerryAxumError> {
    let code = BundleCode::parse(&otp)?;
    let files = state.ferry.resolve(&code).await?;
    let files: Vec<FileView> = files.iter().map(FileView::from).collect();
    Ok(Json(json!({ "otp": code, "files": files })))
}

/// Take the bundle first so a dead code still gets a JSON 404, then stream
/// the archive through a pipe while the response is being sent.
async fn download(
    State(state): State<FerryState>,
    Path(otp): Path<String>,
) -> Result<Response, FerryAxumError> {
    let code = BundleCode::parse(&otp)?;
    let lease = state.ferry.begin_download(&code).await?;

    let (writer, reader) = tokio::io::duplex(DOWNLOAD_PIPE_BYTES);
    let ferry = Arc::clone(&state.ferry);
    tokio::spawn(async move {
        let code = lease.code.clone();
        match ferry.finish_download(lease, writer).await {
            Ok(summary) => info!(
                code = %code,
                entries = summary.entries.len(),
                skipped = summary.skipped.len(),
                bytes = summary.bytes,
                "Bundle downloaded"
            ),
            Err(e) => warn!(code = %code, error = %e, "Bundle download aborted"),
        }
    });

    let headers = [
        (header::CONTENT_TYPE, "application/zip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"files_{}.zip\"", code),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(reader))).into_response())
}
