//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

/// Error returned by every handler. Serialized as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    /// Unhandled failure. The cause is logged, the body stays generic.
    Internal(intake_core::Error),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    ServiceUnavailable(String),
}

impl From<intake_core::Error> for ApiError {
    fn from(err: intake_core::Error) -> Self {
        use intake_core::Error;
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::Validation(msg) => ApiError::BadRequest(msg),
            e @ Error::NoCompletedExtraction(_) => ApiError::BadRequest(e.to_string()),
            Error::Overloaded(msg) => ApiError::ServiceUnavailable(msg),
            Error::InvalidState(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Internal(err) => {
                error!(subsystem = "api", error = %err, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::Error;
    use uuid::Uuid;

    fn status_of(err: Error) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_of(Error::Validation("bad mime".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(Error::NotFound("file".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(Error::NoCompletedExtraction(Uuid::nil())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(Error::Overloaded("queue full".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_of(Error::InvalidState("done".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(Error::ExternalService("ollama down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(Error::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_internal_error_body_is_generic() {
        let response = ApiError::from(Error::Internal("disk on fire".into())).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_no_completed_extraction_message() {
        let id = Uuid::nil();
        let response = ApiError::from(Error::NoCompletedExtraction(id)).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json["error"],
            format!("No completed extraction for file {}", id)
        );
    }
}
