//! Test fixtures for database integration tests.
//!
//! Each [`TestDatabase`] owns a temporary directory holding a fresh SQLite
//! database (already migrated) and an empty content directory. Everything is
//! removed when the fixture is dropped.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use intake_db::test_fixtures::TestDatabase;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let test_db = TestDatabase::new().await;
//!     let file = test_db.upload_pdf("AD-2026-114.pdf").await;
//!     // ...
//! }
//! ```

use std::path::PathBuf;

use tempfile::TempDir;

use crate::{Database, StoredFile};

/// Minimal bytes that pass as a PDF for registry purposes.
pub const SAMPLE_PDF: &[u8] = b"%PDF-1.4\n1 0 obj<<>>endobj\ntrailer<<>>\n%%EOF\n";

/// Temporary database plus content directory.
pub struct TestDatabase {
    pub db: Database,
    dir: TempDir,
}

impl TestDatabase {
    /// Create and migrate a fresh database in a new temporary directory.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = dir.path().join("intake.db");
        let content_dir = dir.path().join("files");

        let db = Database::connect(db_path.to_str().expect("utf-8 temp path"))
            .await
            .expect("Failed to create test database")
            .with_filesystem_storage(content_dir.to_str().expect("utf-8 temp path"));
        db.migrate().await.expect("Failed to run migrations");

        Self { db, dir }
    }

    /// The content directory backing the file registry.
    pub fn content_dir(&self) -> PathBuf {
        self.dir.path().join("files")
    }

    /// Register [`SAMPLE_PDF`] under the given name.
    pub async fn upload_pdf(&self, name: &str) -> StoredFile {
        self.db
            .files
            .store_file(name, "application/pdf", SAMPLE_PDF.to_vec())
            .await
            .expect("Failed to store test file")
    }

    /// Number of objects in the content directory.
    pub fn stored_object_count(&self) -> usize {
        std::fs::read_dir(self.content_dir())
            .map(|entries| entries.filter_map(|e| e.ok()).count())
            .unwrap_or(0)
    }
}
