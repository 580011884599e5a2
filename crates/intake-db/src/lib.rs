//! # intake-db
//!
//! SQLite database layer for the document intake pipeline.
//!
//! This crate provides:
//! - Connection pool management
//! - The file registry and its filesystem storage backend
//! - The extraction run queue (claim, lease, terminal transitions)
//! - The field store
//! - The draft materializer
//!
//! ## Example
//!
//! ```rust,ignore
//! use intake_db::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("sqlite://data/intake.db")
//!         .await?
//!         .with_filesystem_storage("./data/files");
//!     db.migrate().await?;
//!
//!     let file = db.files.store_file("AD-2026-114.pdf", "application/pdf", bytes).await?;
//!     let run = db.runs.create(file.id).await?;
//!     Ok(())
//! }
//! ```
pub mod drafts;
pub mod fields;
pub mod file_storage;
pub mod pool;
pub mod runs;

// Test fixtures for integration tests.
// Always compiled so tests in other crates can build a throwaway database.
pub mod test_fixtures;

// Re-export core types
pub use intake_core::*;

pub use drafts::DraftRepository;
pub use fields::FieldRepository;
pub use file_storage::{
    compute_content_hash, compute_content_hash_blocking, generate_storage_path, FileRegistry,
    FilesystemBackend, StorageBackend,
};
pub use pool::{connect_options, create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use runs::{RunRepository, LEASE_EXPIRED_ERROR, QUEUE_TIMEOUT_ERROR};

use std::sync::Arc;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::SqlitePool,
    /// File registry (rows + content directory).
    pub files: FileRegistry,
    /// Extraction run queue.
    pub runs: RunRepository,
    /// Field store.
    pub fields: FieldRepository,
    /// Draft materializer and draft records.
    pub drafts: DraftRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    ///
    /// The file registry starts on the default content directory; use
    /// [`with_filesystem_storage`](Self::with_filesystem_storage) to point
    /// it elsewhere.
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self {
            files: FileRegistry::new(
                pool.clone(),
                FilesystemBackend::new(defaults::FILE_STORAGE_PATH),
            ),
            runs: RunRepository::new(pool.clone()),
            fields: FieldRepository::new(pool.clone()),
            drafts: DraftRepository::new(pool.clone()),
            pool,
        }
    }

    /// Configure the file registry with a storage backend.
    pub fn with_file_storage(mut self, backend: impl StorageBackend + 'static) -> Self {
        self.files = FileRegistry::with_backend(self.pool.clone(), Arc::new(backend));
        self
    }

    /// Configure the file registry with a filesystem content directory.
    pub fn with_filesystem_storage(self, path: &str) -> Self {
        self.with_file_storage(FilesystemBackend::new(path))
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }
}
