//! Parser adapter registry for dispatching document parsing by MIME type.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, warn};

use intake_core::file_safety::mime_essence;
use intake_core::{DocumentParser, Error, ParserAdapter, Result};

use crate::adapters::{OfficeConvertAdapter, PdfTextAdapter};

/// Registry of parser adapters. The first adapter that handles a MIME type
/// wins.
pub struct ParserRegistry {
    adapters: Vec<Arc<dyn ParserAdapter>>,
}

impl ParserRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Registry with the PDF and office adapters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PdfTextAdapter));
        registry.register(Arc::new(OfficeConvertAdapter::from_env()));
        registry
    }

    /// Register an adapter after those already present.
    pub fn register(&mut self, adapter: Arc<dyn ParserAdapter>) {
        self.adapters.push(adapter);
    }

    /// Adapter for a MIME type, if any.
    pub fn adapter_for(&self, mime_type: &str) -> Option<&Arc<dyn ParserAdapter>> {
        let essence = mime_essence(mime_type);
        self.adapters.iter().find(|a| a.handles(&essence))
    }

    /// Run health checks on all registered adapters.
    pub async fn health_check_all(&self) -> Vec<(String, bool)> {
        let mut results = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let healthy = adapter.health_check().await.unwrap_or(false);
            if !healthy {
                warn!(adapter = adapter.name(), "Parser adapter unavailable");
            }
            results.push((adapter.name().to_string(), healthy));
        }
        results
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentParser for ParserRegistry {
    async fn parse(&self, data: &[u8], filename: &str, mime_type: &str) -> Result<String> {
        let adapter = self.adapter_for(mime_type).ok_or_else(|| {
            Error::ExternalService(format!("No parser registered for {}", mime_type))
        })?;

        let start = Instant::now();
        let text = adapter
            .extract_text(data, filename, &mime_essence(mime_type))
            .await?;
        debug!(
            subsystem = "jobs",
            component = "parser",
            op = "parse",
            adapter = adapter.name(),
            filename,
            text_len = text.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Document parsed"
        );
        Ok(text)
    }
}
