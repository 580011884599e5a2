//! Centralized default constants for the intake pipeline.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates and configuration loaders reference these constants instead of
//! defining their own magic numbers.

// =============================================================================
// UPLOADS
// =============================================================================

/// Maximum accepted upload size in bytes (50 MiB).
pub const MAX_UPLOAD_SIZE_BYTES: usize = 50 * 1024 * 1024;

/// Slack added on top of the upload ceiling for the HTTP body limit, so
/// multipart framing never trips the transport limit before the handler can
/// reject the file itself.
pub const UPLOAD_BODY_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Default content directory for stored binaries.
pub const FILE_STORAGE_PATH: &str = "./data/files";

/// Maximum length of a sanitized filename component.
pub const FILENAME_MAX_LEN: usize = 255;

/// Bytes a storage key adds around the sanitized name: the hyphenated UUID
/// and `_` separator (37), plus the `.` and `.tmp` of the atomic-write temp
/// file (5).
pub const STORAGE_KEY_OVERHEAD_LEN: usize = 37 + 5;

/// Maximum length of the sanitized name inside a storage key, so the temp
/// file name stays within `FILENAME_MAX_LEN`.
pub const STORED_NAME_MAX_LEN: usize = FILENAME_MAX_LEN - STORAGE_KEY_OVERHEAD_LEN;

// =============================================================================
// DATABASE
// =============================================================================

/// Default SQLite database URL.
pub const DATABASE_URL: &str = "sqlite://data/intake.db";

/// Default maximum pool connections.
///
/// SQLite serializes writers; a single connection keeps transactions from
/// failing with `database is locked` when they upgrade to a write lock.
pub const DB_MAX_CONNECTIONS: u32 = 1;

/// Default minimum idle pool connections.
pub const DB_MIN_CONNECTIONS: u32 = 1;

/// Timeout for acquiring a pool connection in seconds.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// SQLite busy timeout in seconds.
pub const DB_BUSY_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP bind host.
pub const SERVER_HOST: &str = "0.0.0.0";

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default CORS max-age in seconds (1 hour).
pub const CORS_MAX_AGE_SECS: u64 = 3600;

/// Default allowed CORS origins when `ALLOWED_ORIGINS` is unset.
pub const ALLOWED_ORIGINS: &str = "http://localhost:3000";

/// Default worker event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model name (Ollama).
pub const GEN_MODEL: &str = "gpt-oss:20b";

/// Timeout for a single AI extraction request in seconds.
pub const AI_TIMEOUT_SECS: u64 = 120;

/// Maximum characters of document text sent to the AI service.
pub const AI_MAX_DOCUMENT_CHARS: usize = 60_000;

/// Default prompt library path.
pub const PROMPTS_PATH: &str = "./prompts.yaml";

// =============================================================================
// EXTRACTION RUNS
// =============================================================================

/// Default worker poll interval in milliseconds.
///
/// The worker is woken by a notification when a run is queued; the poll only
/// covers runs queued by another process or left behind by a restart.
pub const JOB_POLL_INTERVAL_MS: u64 = 5_000;

/// Default maximum concurrently executing runs per worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Default end-to-end timeout for one run in seconds (5 minutes).
pub const JOB_RUN_TIMEOUT_SECS: u64 = 300;

/// Lease granted to a worker when it claims a run, in seconds.
pub const JOB_LEASE_SECS: u64 = 60;

/// Interval between lease renewals while a run executes, in seconds.
pub const JOB_HEARTBEAT_SECS: u64 = 20;

/// Maximum unclaimed runs before new extraction requests are rejected.
pub const JOB_MAX_PENDING: i64 = 1000;

/// Unclaimed runs older than this are failed by the sweeper (1 hour).
pub const JOB_QUEUE_TIMEOUT_SECS: u64 = 3600;

/// Interval between sweeper passes in seconds.
pub const SWEEP_INTERVAL_SECS: u64 = 30;

/// Maximum soft-deleted files reclaimed per sweeper pass.
pub const SWEEP_RECLAIM_BATCH: i64 = 100;

/// Per-command timeout for external parser tools (seconds).
pub const EXTRACTION_CMD_TIMEOUT_SECS: u64 = 60;

/// PDFs with more pages than this are converted in batches.
pub const PDF_LARGE_PAGE_THRESHOLD: usize = 100;

/// Pages per `pdftotext` invocation for large PDFs.
pub const PDF_BATCH_PAGES: usize = 50;

/// Environment variable for LibreOffice path.
pub const ENV_LIBREOFFICE_PATH: &str = "LIBREOFFICE_PATH";

/// LibreOffice binary used when `LIBREOFFICE_PATH` is unset.
pub const LIBREOFFICE_BIN: &str = "soffice";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_outlives_heartbeat() {
        const {
            assert!(JOB_HEARTBEAT_SECS * 2 < JOB_LEASE_SECS);
        }
    }

    #[test]
    fn body_limit_exceeds_upload_ceiling() {
        const {
            assert!(MAX_UPLOAD_SIZE_BYTES + UPLOAD_BODY_OVERHEAD_BYTES > MAX_UPLOAD_SIZE_BYTES);
            assert!(MAX_UPLOAD_SIZE_BYTES == 52_428_800);
        }
    }

    #[test]
    fn command_timeout_fits_run_timeout() {
        const {
            assert!(EXTRACTION_CMD_TIMEOUT_SECS < JOB_RUN_TIMEOUT_SECS);
            assert!(AI_TIMEOUT_SECS < JOB_RUN_TIMEOUT_SECS);
        }
    }
}
