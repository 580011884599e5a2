//! # intake-jobs
//!
//! Extraction orchestration for the document intake pipeline.
//!
//! This crate provides:
//! - [`ExtractionOrchestrator`]: admission control and run lookup
//! - [`JobWorker`]: bounded worker executing queued runs with lease heartbeats
//! - [`ExtractionHandler`]: the parse → classify → extract → validate pipeline
//! - [`ParserRegistry`]: MIME dispatch over `pdftotext` and LibreOffice adapters
//! - [`Sweeper`]: fails runs with lapsed leases or stale queue entries and
//!   reclaims deleted files
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use intake_jobs::{ExtractionHandler, ExtractionOrchestrator, JobWorker, ParserRegistry, WorkerConfig};
//!
//! let orchestrator = ExtractionOrchestrator::from_env(db.clone());
//! let handler = ExtractionHandler::new(db.clone(), Arc::new(ParserRegistry::with_defaults()), extractor, prompts);
//! let handle = JobWorker::new(db, WorkerConfig::from_env(), Arc::new(handler))
//!     .with_wake(orchestrator.wake_handle())
//!     .start();
//!
//! let run = orchestrator.start_extraction(file_id).await?;
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! ```

pub mod adapters;
pub mod extraction_handler;
pub mod handler;
pub mod orchestrator;
pub mod parser;
pub mod sweeper;
pub mod worker;

// Re-export core types
pub use intake_core::*;

pub use adapters::{OfficeConvertAdapter, PdfTextAdapter};
pub use extraction_handler::{validate_candidates, ExtractionHandler};
pub use handler::{RunContext, RunHandler, RunOutcome};
pub use orchestrator::ExtractionOrchestrator;
pub use parser::ParserRegistry;
pub use sweeper::{SweepReport, Sweeper, SweeperConfig, SweeperHandle};
pub use worker::{JobWorker, WorkerConfig, WorkerEvent, WorkerHandle};
