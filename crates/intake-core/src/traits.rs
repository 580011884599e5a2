//! Collaborator traits driven by the extraction orchestrator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::CandidateField;

// =============================================================================
// DOCUMENT PARSING
// =============================================================================

/// Turns a stored binary into plain text.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    /// Parse raw document bytes into text. Fails with
    /// [`Error::ExternalService`](crate::Error::ExternalService) when the
    /// format is unsupported or the underlying tool fails.
    async fn parse(&self, data: &[u8], filename: &str, mime_type: &str) -> Result<String>;
}

/// One concrete parsing strategy (PDF text layer, office conversion, ...).
///
/// Adapters are registered in a parser registry and dispatched on MIME type.
#[async_trait]
pub trait ParserAdapter: Send + Sync {
    /// Whether this adapter handles the given MIME type essence.
    fn handles(&self, mime_type: &str) -> bool;

    /// Extract text from raw file data.
    async fn extract_text(&self, data: &[u8], filename: &str, mime_type: &str) -> Result<String>;

    /// Check if the adapter's external dependencies are available.
    async fn health_check(&self) -> Result<bool>;

    /// Human-readable name of this adapter.
    fn name(&self) -> &str;
}

// =============================================================================
// AI FIELD EXTRACTION
// =============================================================================

/// Input to the AI extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    pub system_prompt: String,
    pub policy_prompt: String,
    pub domain_prompt: Option<String>,
    pub document_text: String,
}

/// AI service that proposes structured fields for a document.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Ask the service for candidate fields. The result is untrusted and must
    /// be validated before persistence.
    async fn extract_fields(&self, request: &ExtractionRequest) -> Result<Vec<CandidateField>>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Check if the service is reachable.
    async fn health_check(&self) -> Result<bool>;
}
