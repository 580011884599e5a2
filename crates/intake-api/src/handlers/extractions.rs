//! Extraction run HTTP handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{ApiError, AppState};
use intake_core::ExtractionDetail;

/// Get a run and the fields it produced.
///
/// Fields are empty until the run completes; a failed run carries its error.
#[utoipa::path(get, path = "/extractions/{run_id}", tag = "Extractions",
    params(("run_id" = Uuid, Path, description = "Extraction run ID")),
    responses(
        (status = 200, description = "Run with fields", body = ExtractionDetail),
        (status = 404, description = "Unknown run")
    ))]
pub async fn get_extraction(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<ExtractionDetail>, ApiError> {
    Ok(Json(state.orchestrator.get_extraction(run_id).await?))
}
