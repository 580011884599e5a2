//! Ollama field extraction backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use intake_core::{CandidateField, Error, ExtractionRequest, FieldExtractor, Result};

use crate::response::parse_candidate_fields;

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = intake_core::defaults::OLLAMA_URL;

/// Default generation model.
pub const DEFAULT_GEN_MODEL: &str = intake_core::defaults::GEN_MODEL;

/// Timeout for extraction requests (seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = intake_core::defaults::AI_TIMEOUT_SECS;

/// Document text beyond this many characters is not sent to the model.
pub const DEFAULT_MAX_DOCUMENT_CHARS: usize = intake_core::defaults::AI_MAX_DOCUMENT_CHARS;

/// Extractions slower than this are logged as slow.
const SLOW_EXTRACTION_MS: u64 = 30_000;

/// Ollama-backed [`FieldExtractor`] using the `/api/chat` endpoint with JSON
/// format enforcement.
pub struct OllamaFieldExtractor {
    client: Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
    max_document_chars: usize,
}

impl OllamaFieldExtractor {
    /// Create an extractor with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(
            DEFAULT_OLLAMA_URL.to_string(),
            DEFAULT_GEN_MODEL.to_string(),
            DEFAULT_TIMEOUT_SECS,
        )
    }

    /// Create an extractor with custom configuration.
    pub fn with_config(base_url: String, model: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        info!(
            subsystem = "inference",
            component = "ollama",
            model = %model,
            timeout_secs,
            "Initializing Ollama field extractor: url={}",
            base_url
        );

        Ok(Self {
            client,
            base_url,
            model,
            timeout_secs,
            max_document_chars: DEFAULT_MAX_DOCUMENT_CHARS,
        })
    }

    /// Create from environment variables (`OLLAMA_BASE`, `OLLAMA_GEN_MODEL`,
    /// `INTAKE_AI_TIMEOUT_SECS`).
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("OLLAMA_BASE").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        let model =
            std::env::var("OLLAMA_GEN_MODEL").unwrap_or_else(|_| DEFAULT_GEN_MODEL.to_string());
        let timeout_secs = std::env::var("INTAKE_AI_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self::with_config(base_url, model, timeout_secs)
    }

    /// Limit the document text sent to the model.
    pub fn with_max_document_chars(mut self, max: usize) -> Self {
        self.max_document_chars = max;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn build_messages(&self, request: &ExtractionRequest) -> Vec<ChatMessage> {
        let mut system = request.system_prompt.trim().to_string();
        for part in [Some(&request.policy_prompt), request.domain_prompt.as_ref()]
            .into_iter()
            .flatten()
        {
            let part = part.trim();
            if !part.is_empty() {
                if !system.is_empty() {
                    system.push_str("\n\n");
                }
                system.push_str(part);
            }
        }

        let document = truncate_chars(&request.document_text, self.max_document_chars);
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: format!("Document text:\n\n{}", document),
        });
        messages
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            format: Some(serde_json::json!("json")),
            think: Some(false),
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::ExternalService(format!("AI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ExternalService(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response.json().await.map_err(|e| {
            Error::ExternalService(format!("Failed to parse Ollama response: {}", e))
        })?;
        Ok(result.message.content)
    }
}

/// Truncate on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Chat API message for `/api/chat`.
#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// Set to `"json"` for guaranteed valid JSON output.
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
    /// Suppresses chain-of-thought output on thinking models.
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

/// Response from the Ollama `/api/chat` endpoint.
#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[async_trait]
impl FieldExtractor for OllamaFieldExtractor {
    #[instrument(skip(self, request), fields(subsystem = "inference", component = "ollama", op = "extract_fields", model = %self.model, prompt_len = request.document_text.len()))]
    async fn extract_fields(&self, request: &ExtractionRequest) -> Result<Vec<CandidateField>> {
        let start = Instant::now();
        debug!(
            domain_prompt = request.domain_prompt.is_some(),
            "Starting field extraction via chat API"
        );

        let content = self.chat(self.build_messages(request)).await?;
        let fields = parse_candidate_fields(&content)?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            response_len = content.len(),
            field_count = fields.len(),
            duration_ms = elapsed,
            "Field extraction complete"
        );
        if elapsed > SLOW_EXTRACTION_MS {
            warn!(duration_ms = elapsed, slow = true, "Slow extraction request");
        }
        Ok(fields)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) => {
                if resp.status().is_success() {
                    info!("Ollama health check passed");
                    Ok(true)
                } else {
                    warn!("Ollama health check failed: {}", resp.status());
                    Ok(false)
                }
            }
            Err(e) => {
                warn!("Ollama health check error: {}", e);
                Ok(false)
            }
        }
    }
}
