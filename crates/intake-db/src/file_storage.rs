//! File registry with SHA-256 integrity hashes and a filesystem backend.
//!
//! Each upload gets its own row and its own object on disk; identical
//! content is not deduplicated. Objects are written atomically and stored as
//! `{id}_{sanitized_original_name}` inside the content directory.
//!
//! Deletion is two-phase: the row is first marked `deleted` (from then on
//! every read path treats it as absent), then the disk object and the row are
//! reclaimed. The reclaim step is idempotent and is retried by the sweeper if
//! it fails the first time.
//!
//! ## Example
//!
//! ```rust,ignore
//! use intake_db::file_storage::{FilesystemBackend, FileRegistry};
//!
//! let registry = FileRegistry::new(pool, FilesystemBackend::new("/var/intake/files"));
//!
//! let file = registry.store_file("AD-2026-114.pdf", "application/pdf", data).await?;
//! let (bytes, file) = registry.download_file(file.id).await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use intake_core::defaults::{MAX_UPLOAD_SIZE_BYTES, STORED_NAME_MAX_LEN};
use intake_core::{sanitize_filename_to, validate_upload, Error, FileStatus, Result, StoredFile};

/// Storage backend trait for different storage implementations.
///
/// Allows abstracting over filesystem, S3, or other storage providers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write data to the specified path.
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read data from the specified path.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete data at the specified path. Deleting a missing object succeeds.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Check if data exists at the specified path.
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Filesystem storage backend rooted at the content directory.
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend with the given base directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }

    /// Validate that the storage backend can write, read, and delete files.
    ///
    /// Performs a full round-trip at startup to catch permission errors and
    /// missing mounts before the first upload does.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_dir = self.base_path.join(".health-check");
        let test_file = test_dir.join("test.bin");

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", test_dir, e))?;

        let data = b"storage-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", test_file, e))?;

        let read_data = fs::read(&test_file)
            .await
            .map_err(|e| format!("read({:?}): {}", test_file, e))?;
        if read_data != data {
            return Err("read-back mismatch".to_string());
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", test_file, e))?;
        let _ = fs::remove_dir(&test_dir).await; // Best-effort cleanup

        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        debug!(storage_path = %path, full_path = %full_path.display(), size = data.len(), "file_storage: write");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "file_storage: create_dir_all failed");
                e
            })?;
        }

        // Atomic write: temp file + rename
        let temp_path = full_path.with_file_name(format!(".{}.tmp", path));
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            warn!(temp_path = %temp_path.display(), error = %e, "file_storage: File::create failed");
            e
        })?;
        if let Err(e) = file.write_all(data).await {
            warn!(error = %e, "file_storage: write_all failed");
            drop(file);
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "file_storage: rename failed");
            e
        })?;

        // Set permissions to 0644 (rw-r--r--, no execute)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path);
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "stored object {} missing",
                path
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        match fs::remove_file(full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path);
        Ok(fs::try_exists(full_path).await?)
    }
}

/// Compute the lowercase hex SHA-256 of data.
pub fn compute_content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash on the blocking pool so large uploads don't stall the runtime.
///
/// Ownership of the buffer is handed back alongside the digest.
pub async fn compute_content_hash_blocking(data: Vec<u8>) -> Result<(Vec<u8>, String)> {
    tokio::task::spawn_blocking(move || {
        let hash = compute_content_hash(&data);
        (data, hash)
    })
    .await
    .map_err(|e| Error::Internal(format!("hash task failed: {}", e)))
}

/// Storage key for a file: `{id}_{sanitized_original_name}`.
///
/// The name part is capped at `STORED_NAME_MAX_LEN` so the key and its
/// `.{key}.tmp` sibling both fit a single path component.
pub fn generate_storage_path(id: &Uuid, original_name: &str) -> String {
    format!(
        "{}_{}",
        id.as_hyphenated(),
        sanitize_filename_to(original_name, STORED_NAME_MAX_LEN)
    )
}

const FILE_COLUMNS: &str =
    "id, original_name, stored_path, mime, size_bytes, sha256, status, created_at, deleted_at";

/// SQLite-backed file registry.
#[derive(Clone)]
pub struct FileRegistry {
    pool: SqlitePool,
    backend: Arc<dyn StorageBackend>,
    max_size_bytes: usize,
}

impl FileRegistry {
    /// Create a new file registry.
    pub fn new(pool: SqlitePool, backend: impl StorageBackend + 'static) -> Self {
        Self::with_backend(pool, Arc::new(backend))
    }

    /// Create a registry sharing an existing backend.
    pub fn with_backend(pool: SqlitePool, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            pool,
            backend,
            max_size_bytes: MAX_UPLOAD_SIZE_BYTES,
        }
    }

    /// Override the upload ceiling.
    pub fn max_size_bytes(mut self, max: usize) -> Self {
        self.max_size_bytes = max;
        self
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Register an upload.
    ///
    /// Validates MIME type and size before anything touches disk, hashes the
    /// content, writes the object, then inserts the row. If the insert fails
    /// the object is removed again.
    pub async fn store_file(
        &self,
        original_name: &str,
        mime: &str,
        data: Vec<u8>,
    ) -> Result<StoredFile> {
        validate_upload(mime, data.len(), self.max_size_bytes)?;

        let id = Uuid::now_v7();
        let size_bytes = data.len() as i64;
        let (data, sha256) = compute_content_hash_blocking(data).await?;
        let stored_path = generate_storage_path(&id, original_name);

        self.backend.write(&stored_path, &data).await?;
        drop(data);

        let created_at = Utc::now();
        let inserted = sqlx::query(
            r#"INSERT INTO stored_file
               (id, original_name, stored_path, mime, size_bytes, sha256, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)"#,
        )
        .bind(id)
        .bind(original_name)
        .bind(&stored_path)
        .bind(mime)
        .bind(size_bytes)
        .bind(&sha256)
        .bind(created_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = inserted {
            warn!(
                subsystem = "database",
                component = "file_registry",
                op = "store_file",
                file_id = %id,
                error = %e,
                "Registry insert failed, removing written object"
            );
            if let Err(cleanup) = self.backend.delete(&stored_path).await {
                warn!(file_id = %id, error = %cleanup, "Orphaned object cleanup failed");
            }
            return Err(e.into());
        }

        info!(
            subsystem = "database",
            component = "file_registry",
            op = "store_file",
            file_id = %id,
            size_bytes,
            mime,
            "File registered"
        );

        Ok(StoredFile {
            id,
            original_name: original_name.to_string(),
            stored_path,
            mime: mime.to_string(),
            size_bytes,
            sha256,
            status: FileStatus::Pending,
            created_at,
            deleted_at: None,
        })
    }

    /// Get a live file by ID. Soft-deleted files are reported as not found.
    pub async fn get(&self, id: Uuid) -> Result<StoredFile> {
        sqlx::query(&format!(
            "SELECT {} FROM stored_file WHERE id = ? AND status = 'pending'",
            FILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| stored_file_from_row(&row))
        .transpose()?
        .ok_or_else(|| Error::NotFound(format!("File {} not found", id)))
    }

    /// List live files, newest first.
    pub async fn list(&self) -> Result<Vec<StoredFile>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM stored_file WHERE status = 'pending' \
             ORDER BY created_at DESC, rowid DESC",
            FILE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(stored_file_from_row).collect()
    }

    /// Download file content by ID.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the row is missing or deleted, or if the
    /// object is missing from the content directory.
    pub async fn download_file(&self, id: Uuid) -> Result<(Vec<u8>, StoredFile)> {
        let file = self.get(id).await?;
        let data = self.backend.read(&file.stored_path).await.map_err(|e| {
            if matches!(e, Error::NotFound(_)) {
                warn!(
                    subsystem = "database",
                    component = "file_registry",
                    op = "download_file",
                    file_id = %id,
                    stored_path = %file.stored_path,
                    "Registry row has no object on disk"
                );
            }
            e
        })?;
        Ok((data, file))
    }

    /// Delete a file.
    ///
    /// The soft delete is what callers observe: once it commits, the file is
    /// gone from every read path. Object and row removal follow immediately
    /// but are best-effort; leftovers are picked up by [`reclaim_deleted`].
    ///
    /// [`reclaim_deleted`]: FileRegistry::reclaim_deleted
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let stored_path: Option<String> = sqlx::query_scalar(
            r#"UPDATE stored_file SET status = 'deleted', deleted_at = ?
               WHERE id = ? AND status = 'pending'
               RETURNING stored_path"#,
        )
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let stored_path = stored_path.ok_or_else(|| Error::NotFound(format!("File {} not found", id)))?;

        info!(
            subsystem = "database",
            component = "file_registry",
            op = "delete",
            file_id = %id,
            "File marked deleted"
        );

        if let Err(e) = self.reclaim(id, &stored_path).await {
            warn!(
                subsystem = "database",
                component = "file_registry",
                op = "delete",
                file_id = %id,
                error = %e,
                "Immediate reclaim failed, leaving for sweeper"
            );
        }
        Ok(())
    }

    /// Reclaim up to `limit` soft-deleted files. Returns how many were removed.
    pub async fn reclaim_deleted(&self, limit: i64) -> Result<usize> {
        let rows = sqlx::query(
            r#"SELECT id, stored_path FROM stored_file
               WHERE status = 'deleted'
               ORDER BY deleted_at
               LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut reclaimed = 0;
        for row in rows {
            let id: Uuid = row.try_get("id")?;
            let stored_path: String = row.try_get("stored_path")?;
            match self.reclaim(id, &stored_path).await {
                Ok(()) => reclaimed += 1,
                Err(e) => warn!(
                    subsystem = "database",
                    component = "file_registry",
                    op = "reclaim_deleted",
                    file_id = %id,
                    error = %e,
                    "Reclaim failed"
                ),
            }
        }
        Ok(reclaimed)
    }

    /// Remove the object then the row; runs and fields cascade with the row.
    async fn reclaim(&self, id: Uuid, stored_path: &str) -> Result<()> {
        self.backend.delete(stored_path).await?;
        sqlx::query("DELETE FROM stored_file WHERE id = ? AND status = 'deleted'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        debug!(file_id = %id, "file_storage: reclaimed");
        Ok(())
    }
}

pub(crate) fn stored_file_from_row(row: &SqliteRow) -> Result<StoredFile> {
    let status: String = row.try_get("status")?;
    Ok(StoredFile {
        id: row.try_get("id")?,
        original_name: row.try_get("original_name")?,
        stored_path: row.try_get("stored_path")?,
        mime: row.try_get("mime")?,
        size_bytes: row.try_get("size_bytes")?,
        sha256: row.try_get("sha256")?,
        status: status.parse().map_err(Error::Internal)?,
        created_at: row.try_get("created_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}
