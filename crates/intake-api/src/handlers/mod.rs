//! HTTP handlers for intake-api.

pub mod drafts;
pub mod extractions;
pub mod files;
