//! Draft HTTP handlers.
//!
//! Applying an extraction snapshots the fields of the latest completed run
//! into a new draft record. Every apply creates a new draft.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{ApiError, AppState};
use intake_core::{DraftField, DraftRecord, DraftStatus};

/// Response for `POST /files/:id/apply`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    pub success: bool,
    pub draft_id: Uuid,
    pub status: DraftStatus,
    pub created_at: DateTime<Utc>,
    pub fields: Vec<DraftField>,
}

/// Materialize a draft from the latest completed run of a file.
#[utoipa::path(post, path = "/files/{id}/apply", tag = "Drafts",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "Draft created", body = ApplyResponse),
        (status = 400, description = "File has no completed extraction")
    ))]
pub async fn apply_extraction(
    State(state): State<AppState>,
    Path(file_id): Path<Uuid>,
) -> Result<Json<ApplyResponse>, ApiError> {
    let draft = state.db.drafts.materialize(file_id).await?;

    info!(
        subsystem = "api",
        op = "apply",
        file_id = %file_id,
        draft_id = %draft.id,
        run_id = %draft.extraction_run_id,
        field_count = draft.payload.fields.len(),
        "Draft created"
    );

    Ok(Json(ApplyResponse {
        success: true,
        draft_id: draft.id,
        status: draft.status,
        created_at: draft.created_at,
        fields: draft.payload.fields,
    }))
}

/// List drafts, newest first.
#[utoipa::path(get, path = "/drafts", tag = "Drafts",
    responses((status = 200, description = "Draft records", body = Vec<DraftRecord>)))]
pub async fn list_drafts(
    State(state): State<AppState>,
) -> Result<Json<Vec<DraftRecord>>, ApiError> {
    Ok(Json(state.db.drafts.list().await?))
}

/// Get one draft.
#[utoipa::path(get, path = "/drafts/{id}", tag = "Drafts",
    params(("id" = Uuid, Path, description = "Draft ID")),
    responses(
        (status = 200, description = "Draft record", body = DraftRecord),
        (status = 404, description = "Unknown draft")
    ))]
pub async fn get_draft(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DraftRecord>, ApiError> {
    Ok(Json(state.db.drafts.get(id).await?))
}
