//! # intake-inference
//!
//! AI field extraction for the document intake pipeline.
//!
//! This crate provides:
//! - [`OllamaFieldExtractor`], a [`FieldExtractor`] backed by the Ollama chat API
//! - [`PromptLibrary`], the YAML prompt library and keyword document classifier
//! - Lenient parsing of model output into candidate fields
//!
//! # Example
//!
//! ```rust,no_run
//! use intake_inference::{OllamaFieldExtractor, PromptLibrary};
//! use intake_core::FieldExtractor;
//!
//! #[tokio::main]
//! async fn main() -> intake_core::Result<()> {
//!     let prompts = PromptLibrary::load("./prompts.yaml")?;
//!     let extractor = OllamaFieldExtractor::from_env()?;
//!     let request = prompts.build_request("AD-2026-114.pdf", "Doc number: DOC-2026-001");
//!     let candidates = extractor.extract_fields(&request).await?;
//!     println!("{} candidate fields", candidates.len());
//!     Ok(())
//! }
//! ```

pub mod ollama;
pub mod prompts;
pub mod response;

pub use intake_core::*;

pub use ollama::OllamaFieldExtractor;
pub use prompts::{DomainPrompt, PromptLibrary};
pub use response::{clean_model_output, parse_candidate_fields};
