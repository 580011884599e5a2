//! Prompt library and document classification.
//!
//! The library holds the system prompt, the extraction policy prompt and a
//! set of domain prompts keyed by document class. It is loaded once at
//! startup from a YAML file:
//!
//! ```yaml
//! system: |
//!   You extract structured fields from documents.
//! policy: |
//!   Return JSON of the form {"fields": [...]}.
//! domains:
//!   - class: airworthiness_directive
//!     keywords: ["airworthiness directive", "AD-"]
//!     prompt: |
//!       Extract doc_number, effective_date and applicability.
//! ```
//!
//! Classification is keyword scoring over the filename and the document
//! text; the best-scoring domain contributes its prompt to the request.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use intake_core::{Error, ExtractionRequest, Result};

/// Built-in system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a document intake assistant. \
You read the text of one business document and report the structured fields it contains. \
You never invent values that are not supported by the text.";

/// Built-in policy prompt describing the expected output.
pub const DEFAULT_POLICY_PROMPT: &str = r#"Respond with JSON only, in the form
{"fields": [{"fieldCode": "...", "value": ..., "valueType": "string|number|date|enum", "confidence": 0.0-1.0, "provenance": "..."}]}.
Rules:
- fieldCode is a short snake_case identifier such as doc_number or effective_date.
- Dates use the ISO format YYYY-MM-DD.
- Numbers are JSON numbers without units.
- For enum values include "options" with the allowed values.
- confidence is your probability that the value is correct.
- provenance says where the value was found, e.g. "page 1, header".
- Omit fields you cannot find. Return {"fields": []} if nothing applies."#;

/// Domain prompt selected when a document matches its class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainPrompt {
    /// Document class identifier, e.g. `airworthiness_directive`.
    pub class: String,
    /// Case-insensitive phrases that indicate this class.
    #[serde(default)]
    pub keywords: Vec<String>,
    pub prompt: String,
}

impl DomainPrompt {
    /// Keyword score for a document. Each keyword found in the text counts
    /// once; a hit in the filename counts twice.
    fn score(&self, filename_lower: &str, text_lower: &str) -> usize {
        self.keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .map(|k| {
                let mut s = 0;
                if text_lower.contains(&k) {
                    s += 1;
                }
                if filename_lower.contains(&k) {
                    s += 2;
                }
                s
            })
            .sum()
    }
}

/// System, policy and domain prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptLibrary {
    #[serde(default = "default_system")]
    pub system: String,
    #[serde(default = "default_policy")]
    pub policy: String,
    #[serde(default)]
    pub domains: Vec<DomainPrompt>,
}

fn default_system() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_policy() -> String {
    DEFAULT_POLICY_PROMPT.to_string()
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self {
            system: default_system(),
            policy: default_policy(),
            domains: Vec::new(),
        }
    }
}

impl PromptLibrary {
    /// Parse a library from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let library: PromptLibrary = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("invalid prompt library: {}", e)))?;
        library.validate()?;
        Ok(library)
    }

    /// Load the library from a file. A missing file yields the built-in
    /// defaults; an unreadable or invalid file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(yaml) => {
                let library = Self::from_yaml_str(&yaml)?;
                info!(
                    subsystem = "inference",
                    component = "prompts",
                    path = %path.display(),
                    domain_count = library.domains.len(),
                    "Prompt library loaded"
                );
                Ok(library)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    subsystem = "inference",
                    component = "prompts",
                    path = %path.display(),
                    "Prompt library not found, using built-in prompts"
                );
                Ok(Self::default())
            }
            Err(e) => Err(Error::Config(format!(
                "cannot read prompt library {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.system.trim().is_empty() {
            return Err(Error::Config("prompt library: empty system prompt".into()));
        }
        if self.policy.trim().is_empty() {
            return Err(Error::Config("prompt library: empty policy prompt".into()));
        }
        for (i, domain) in self.domains.iter().enumerate() {
            if domain.class.trim().is_empty() {
                return Err(Error::Config(format!(
                    "prompt library: domain #{} has no class",
                    i + 1
                )));
            }
            if domain.prompt.trim().is_empty() {
                return Err(Error::Config(format!(
                    "prompt library: domain {} has an empty prompt",
                    domain.class
                )));
            }
            if self.domains[..i].iter().any(|d| d.class == domain.class) {
                return Err(Error::Config(format!(
                    "prompt library: duplicate domain {}",
                    domain.class
                )));
            }
        }
        Ok(())
    }

    /// Pick the domain whose keywords best match the document. Ties go to
    /// the domain declared first; no match at all yields `None`.
    pub fn classify(&self, filename: &str, text: &str) -> Option<&DomainPrompt> {
        let filename_lower = filename.to_lowercase();
        let text_lower = text.to_lowercase();

        let mut best: Option<(&DomainPrompt, usize)> = None;
        for domain in &self.domains {
            let score = domain.score(&filename_lower, &text_lower);
            if score > 0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((domain, score));
            }
        }

        debug!(
            subsystem = "inference",
            component = "prompts",
            op = "classify",
            doc_class = best.map(|(d, _)| d.class.as_str()).unwrap_or("none"),
            score = best.map(|(_, s)| s).unwrap_or(0),
            "Document classified"
        );
        best.map(|(d, _)| d)
    }

    /// Assemble the extraction request for a parsed document.
    pub fn build_request(&self, filename: &str, document_text: &str) -> ExtractionRequest {
        ExtractionRequest {
            system_prompt: self.system.clone(),
            policy_prompt: self.policy.clone(),
            domain_prompt: self
                .classify(filename, document_text)
                .map(|d| d.prompt.clone()),
            document_text: document_text.to_string(),
        }
    }
}
