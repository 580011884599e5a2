//! File registry HTTP handlers.
//!
//! Upload, list, inspect, download and delete stored documents, plus the
//! entry points that start and list extraction runs for a file.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderValue},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{ApiError, AppState};
use intake_core::{detect_content_type, ExtractionRun, RunStatus, StoredFile};

/// Response for `POST /files/:id/extract`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionStarted {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
}

/// List live files, newest first.
#[utoipa::path(get, path = "/files", tag = "Files",
    responses((status = 200, description = "Registered files", body = Vec<StoredFile>)))]
pub async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<StoredFile>>, ApiError> {
    Ok(Json(state.db.files.list().await?))
}

/// Upload a document.
///
/// # Multipart Fields
/// - `file`: the document (required)
///
/// The body is read chunk by chunk and rejected as soon as it passes the
/// upload ceiling. The content type claimed by the client is checked against
/// the allow-list; when it is missing or generic the type is sniffed from the
/// bytes and the filename.
///
/// # Returns
/// - 200 OK with the stored file
/// - 400 Bad Request for a missing field, an empty or oversize file, or a
///   disallowed type
#[utoipa::path(post, path = "/upload", tag = "Files",
    responses(
        (status = 200, description = "File registered", body = StoredFile),
        (status = 400, description = "Missing field, disallowed type or oversize file")
    ))]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StoredFile>, ApiError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("Uploaded file has no filename".to_string()))?;
        let claimed = field.content_type().unwrap_or_default().to_string();

        let mut data = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?
        {
            if data.len() + chunk.len() > state.max_upload_bytes {
                return Err(ApiError::BadRequest(format!(
                    "file exceeds maximum size of {} bytes",
                    state.max_upload_bytes
                )));
            }
            data.extend_from_slice(&chunk);
        }
        if data.is_empty() {
            return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
        }

        let mime = detect_content_type(&filename, &data, &claimed);
        let file = state.db.files.store_file(&filename, &mime, data).await?;

        info!(
            subsystem = "api",
            op = "upload",
            file_id = %file.id,
            size_bytes = file.size_bytes,
            mime = %file.mime,
            "File uploaded"
        );
        return Ok(Json(file));
    }

    Err(ApiError::BadRequest(
        "No file uploaded. Use field name 'file'.".to_string(),
    ))
}

/// Get file metadata.
#[utoipa::path(get, path = "/files/{id}", tag = "Files",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "File metadata", body = StoredFile),
        (status = 404, description = "Unknown or deleted file")
    ))]
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StoredFile>, ApiError> {
    Ok(Json(state.db.files.get(id).await?))
}

/// Download the original bytes as an attachment.
#[utoipa::path(get, path = "/files/{id}/download", tag = "Files",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "File content"),
        (status = 404, description = "Unknown or deleted file, or missing object")
    ))]
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (data, file) = state.db.files.download_file(id).await?;

    let content_type = HeaderValue::from_str(&file.mime)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&content_disposition(&file.original_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    ))
}

/// `attachment` disposition carrying the original filename: an ASCII
/// fallback plus the RFC 5987 encoded form.
pub fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

/// Delete a file. Its runs and fields go with it; drafts keep their copy.
#[utoipa::path(delete, path = "/files/{id}", tag = "Files",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "File deleted"),
        (status = 404, description = "Unknown or already deleted file")
    ))]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.db.files.delete(id).await?;
    info!(subsystem = "api", op = "delete", file_id = %id, "File deleted");
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Queue an extraction run for a file.
///
/// Returns immediately; poll `GET /extractions/{runId}` for the outcome.
#[utoipa::path(post, path = "/files/{id}/extract", tag = "Extractions",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "Run queued", body = ExtractionStarted),
        (status = 404, description = "Unknown or deleted file"),
        (status = 503, description = "Too many queued runs")
    ))]
pub async fn start_extraction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExtractionStarted>, ApiError> {
    let run = state.orchestrator.start_extraction(id).await?;
    Ok(Json(ExtractionStarted {
        run_id: run.id,
        status: run.status,
        started_at: run.started_at,
    }))
}

/// All extraction runs of a file, newest first.
#[utoipa::path(get, path = "/files/{id}/extractions", tag = "Extractions",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "Runs of the file", body = Vec<ExtractionRun>),
        (status = 404, description = "Unknown or deleted file")
    ))]
pub async fn list_extractions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ExtractionRun>>, ApiError> {
    Ok(Json(state.orchestrator.list_extractions(id).await?))
}
