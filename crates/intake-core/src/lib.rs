//! # intake-core
//!
//! Core types, traits, and abstractions for the document intake pipeline.
//!
//! This crate provides the data model shared by the file registry, the
//! extraction orchestrator, the field store and the draft materializer, plus
//! the collaborator traits (document parser, field extractor) that the
//! orchestrator drives.

pub mod defaults;
pub mod error;
pub mod file_safety;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use file_safety::{
    detect_content_type, is_allowed_mime, sanitize_filename, sanitize_filename_to, validate_upload,
    ALLOWED_MIME_TYPES,
};
pub use models::*;
pub use traits::*;
