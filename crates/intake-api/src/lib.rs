//! # intake-api
//!
//! HTTP surface of the document intake pipeline: upload and manage stored
//! files, start and poll extraction runs, and materialize drafts.
//!
//! The binary in `main.rs` wires configuration, logging, the database, the
//! extraction worker and the sweeper around [`build_router`].

pub mod config;
pub mod error;
pub mod handlers;

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use uuid::Uuid;

use intake_core::defaults;
use intake_db::Database;
use intake_jobs::ExtractionOrchestrator;

pub use config::ApiConfig;
pub use error::ApiError;

use handlers::{drafts, extractions, files};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub orchestrator: ExtractionOrchestrator,
    /// Upload ceiling enforced while the multipart body streams in.
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(db: Database, orchestrator: ExtractionOrchestrator) -> Self {
        Self {
            db,
            orchestrator,
            max_upload_bytes: defaults::MAX_UPLOAD_SIZE_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max: usize) -> Self {
        self.max_upload_bytes = max;
        self
    }
}

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// OPENAPI
// =============================================================================

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Document Intake API",
        description = "Upload documents, extract structured fields with an AI service, and stage them as drafts"
    ),
    paths(
        health_check,
        files::list_files,
        files::upload_file,
        files::get_file,
        files::download_file,
        files::delete_file,
        files::start_extraction,
        files::list_extractions,
        extractions::get_extraction,
        drafts::apply_extraction,
        drafts::list_drafts,
        drafts::get_draft,
    ),
    components(schemas(
        intake_core::StoredFile,
        intake_core::FileStatus,
        intake_core::ExtractionRun,
        intake_core::RunStatus,
        intake_core::ExtractionDetail,
        intake_core::ExtractedField,
        intake_core::ValueType,
        intake_core::DraftRecord,
        intake_core::DraftStatus,
        intake_core::DraftPayload,
        intake_core::DraftField,
        files::ExtractionStarted,
        drafts::ApplyResponse,
    )),
    tags(
        (name = "Files", description = "File registry"),
        (name = "Extractions", description = "Asynchronous field extraction runs"),
        (name = "Drafts", description = "Staged records built from completed runs"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// =============================================================================
// HEALTH CHECK
// =============================================================================

/// Liveness probe.
#[utoipa::path(get, path = "/health", tag = "System",
    responses((status = 200, description = "Service is up")))]
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// ROUTER
// =============================================================================

/// Build the application router with tracing, request IDs, CORS and the
/// upload body limit applied.
pub fn build_router(state: AppState, config: &ApiConfig) -> Router {
    // The transport limit sits above the upload ceiling so the handler can
    // answer an oversize file with a 400 instead of a bare 413.
    let body_limit = state.max_upload_bytes + defaults::UPLOAD_BODY_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health_check))
        .route("/openapi.json", get(openapi_json))
        .route("/files", get(files::list_files))
        .route("/upload", post(files::upload_file))
        .route("/files/:id", get(files::get_file).delete(files::delete_file))
        .route("/files/:id/download", get(files::download_file))
        .route("/files/:id/extract", post(files::start_extraction))
        .route("/files/:id/extractions", get(files::list_extractions))
        .route("/files/:id/apply", post(drafts::apply_extraction))
        .route("/extractions/:run_id", get(extractions::get_extraction))
        .route("/drafts", get(drafts::list_drafts))
        .route("/drafts/:id", get(drafts::get_draft))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(config.allowed_origins.clone()))
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
                .expose_headers([header::CONTENT_DISPOSITION])
                .max_age(Duration::from_secs(defaults::CORS_MAX_AGE_SECS)),
        )
        .with_state(state)
}
