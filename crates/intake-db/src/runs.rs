//! Extraction run repository.
//!
//! The `extraction_run` table doubles as the durable work queue: a run that
//! is `running` with no `claimed_at` is waiting for a worker. Claiming sets a
//! lease that the worker renews while it executes; the sweeper fails runs
//! whose lease lapsed. Every transition out of `running` is guarded by
//! `WHERE status = 'running'`, so a run reaches a terminal state exactly once.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use intake_core::{Error, ExtractionDetail, ExtractionRun, NewExtractedField, Result};

use crate::fields::{insert_for_run, FieldRepository};

/// Error recorded on runs whose worker stopped renewing its lease.
pub const LEASE_EXPIRED_ERROR: &str = "lease expired";

/// Error recorded on runs that waited in the queue too long.
pub const QUEUE_TIMEOUT_ERROR: &str = "queue timeout";

const RUN_COLUMNS: &str = "r.id AS id, r.file_id AS file_id, r.status AS status, \
     r.started_at AS started_at, r.completed_at AS completed_at, r.error AS error";

const RETURNING_RUN: &str = "RETURNING id, file_id, status, started_at, completed_at, error";

/// SQLite extraction run repository.
#[derive(Clone)]
pub struct RunRepository {
    pool: SqlitePool,
}

fn lease_deadline(now: DateTime<Utc>, lease: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(lease)
        .map(|d| now + d)
        .map_err(|e| Error::Config(format!("invalid lease duration: {}", e)))
}

impl RunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Queue a new run for a live file.
    ///
    /// The existence check and the insert are one statement, so a file
    /// deleted concurrently never receives a run.
    pub async fn create(&self, file_id: Uuid) -> Result<ExtractionRun> {
        self.create_within_limit(file_id, i64::MAX).await
    }

    /// Queue a new run unless `max_pending` unclaimed runs already wait.
    ///
    /// The queue-depth check rides in the same `INSERT ... SELECT` as the file
    /// check, so concurrent starts cannot push the queue past the limit.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown or deleted files, `Overloaded` when the queue
    /// is full.
    pub async fn create_within_limit(
        &self,
        file_id: Uuid,
        max_pending: i64,
    ) -> Result<ExtractionRun> {
        let id = Uuid::now_v7();
        let row = sqlx::query(&format!(
            r#"INSERT INTO extraction_run (id, file_id, status, started_at)
               SELECT ?, f.id, 'running', ? FROM stored_file f
               WHERE f.id = ? AND f.status = 'pending'
                 AND (SELECT COUNT(*) FROM extraction_run
                      WHERE status = 'running' AND claimed_at IS NULL) < ?
               {}"#,
            RETURNING_RUN
        ))
        .bind(id)
        .bind(Utc::now())
        .bind(file_id)
        .bind(max_pending)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            let live: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM stored_file WHERE id = ? AND status = 'pending')",
            )
            .bind(file_id)
            .fetch_one(&self.pool)
            .await?;
            return Err(if live {
                Error::Overloaded(format!(
                    "{} extraction runs already queued",
                    self.pending_count().await?
                ))
            } else {
                Error::NotFound(format!("File {} not found", file_id))
            });
        };

        let run = run_from_row(&row)?;
        info!(
            subsystem = "database",
            component = "runs",
            op = "create",
            run_id = %run.id,
            file_id = %file_id,
            "Extraction run queued"
        );
        Ok(run)
    }

    /// Claim the oldest unclaimed run and grant it a lease.
    pub async fn claim_next(&self, lease: Duration) -> Result<Option<ExtractionRun>> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"UPDATE extraction_run
               SET claimed_at = ?, lease_expires_at = ?
               WHERE id = (
                   SELECT r.id FROM extraction_run r
                   JOIN stored_file f ON f.id = r.file_id
                   WHERE r.status = 'running' AND r.claimed_at IS NULL
                     AND f.status = 'pending'
                   ORDER BY r.started_at, r.rowid
                   LIMIT 1
               )
               {}"#,
            RETURNING_RUN
        ))
        .bind(now)
        .bind(lease_deadline(now, lease)?)
        .fetch_optional(&self.pool)
        .await?;

        let run = row.map(|r| run_from_row(&r)).transpose()?;
        if let Some(ref run) = run {
            debug!(
                subsystem = "database",
                component = "runs",
                op = "claim_next",
                run_id = %run.id,
                "Claimed run"
            );
        }
        Ok(run)
    }

    /// Extend the lease of a claimed run. Returns false if the run is no
    /// longer running (already terminal or swept).
    pub async fn renew_lease(&self, run_id: Uuid, lease: Duration) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE extraction_run SET lease_expires_at = ?
               WHERE id = ? AND status = 'running' AND claimed_at IS NOT NULL"#,
        )
        .bind(lease_deadline(Utc::now(), lease)?)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Persist the fields and mark the run completed, in one transaction.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the run already reached a terminal state,
    /// `NotFound` if it does not exist.
    pub async fn complete(
        &self,
        run_id: Uuid,
        fields: &[NewExtractedField],
    ) -> Result<ExtractionRun> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"UPDATE extraction_run
               SET status = 'completed', completed_at = ?, lease_expires_at = NULL
               WHERE id = ? AND status = 'running'
               {}"#,
            RETURNING_RUN
        ))
        .bind(Utc::now())
        .bind(run_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM extraction_run WHERE id = ?)")
                    .bind(run_id)
                    .fetch_one(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Err(terminal_error(run_id, exists));
        };
        let run = run_from_row(&row)?;

        insert_for_run(&mut tx, run_id, fields).await?;
        tx.commit().await?;

        info!(
            subsystem = "database",
            component = "runs",
            op = "complete",
            run_id = %run_id,
            field_count = fields.len(),
            "Extraction run completed"
        );
        Ok(run)
    }

    /// Mark the run failed with an error message.
    pub async fn fail(&self, run_id: Uuid, error: &str) -> Result<ExtractionRun> {
        let row = sqlx::query(&format!(
            r#"UPDATE extraction_run
               SET status = 'failed', completed_at = ?, error = ?, lease_expires_at = NULL
               WHERE id = ? AND status = 'running'
               {}"#,
            RETURNING_RUN
        ))
        .bind(Utc::now())
        .bind(error)
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                info!(
                    subsystem = "database",
                    component = "runs",
                    op = "fail",
                    run_id = %run_id,
                    error,
                    "Extraction run failed"
                );
                run_from_row(&row)
            }
            None => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM extraction_run WHERE id = ?)")
                        .bind(run_id)
                        .fetch_one(&self.pool)
                        .await?;
                Err(terminal_error(run_id, exists))
            }
        }
    }

    /// Fail claimed runs whose lease ran out. Returns the affected run IDs.
    pub async fn expire_leases(&self) -> Result<Vec<Uuid>> {
        let now = Utc::now();
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"UPDATE extraction_run
               SET status = 'failed', completed_at = ?, error = ?, lease_expires_at = NULL
               WHERE status = 'running' AND claimed_at IS NOT NULL AND lease_expires_at < ?
               RETURNING id"#,
        )
        .bind(now)
        .bind(LEASE_EXPIRED_ERROR)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Fail unclaimed runs queued before `now - max_wait`.
    pub async fn expire_unclaimed(&self, max_wait: Duration) -> Result<Vec<Uuid>> {
        let now = Utc::now();
        let cutoff = chrono::Duration::from_std(max_wait)
            .map(|d| now - d)
            .map_err(|e| Error::Config(format!("invalid queue timeout: {}", e)))?;
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"UPDATE extraction_run
               SET status = 'failed', completed_at = ?, error = ?
               WHERE status = 'running' AND claimed_at IS NULL AND started_at < ?
               RETURNING id"#,
        )
        .bind(now)
        .bind(QUEUE_TIMEOUT_ERROR)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Number of runs waiting for a worker.
    pub async fn pending_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM extraction_run WHERE status = 'running' AND claimed_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Get a run by ID. Runs of deleted files are not found.
    pub async fn get(&self, run_id: Uuid) -> Result<ExtractionRun> {
        sqlx::query(&format!(
            r#"SELECT {} FROM extraction_run r
               JOIN stored_file f ON f.id = r.file_id
               WHERE r.id = ? AND f.status = 'pending'"#,
            RUN_COLUMNS
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| run_from_row(&row))
        .transpose()?
        .ok_or_else(|| Error::NotFound(format!("Extraction run {} not found", run_id)))
    }

    /// A run together with its fields.
    pub async fn get_detail(&self, run_id: Uuid) -> Result<ExtractionDetail> {
        let run = self.get(run_id).await?;
        let fields = FieldRepository::new(self.pool.clone())
            .list_for_run(run_id)
            .await?;
        Ok(ExtractionDetail { run, fields })
    }

    /// All runs for a file, newest first.
    pub async fn list_for_file(&self, file_id: Uuid) -> Result<Vec<ExtractionRun>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {} FROM extraction_run r
               JOIN stored_file f ON f.id = r.file_id
               WHERE r.file_id = ? AND f.status = 'pending'
               ORDER BY r.started_at DESC, r.rowid DESC"#,
            RUN_COLUMNS
        ))
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(run_from_row).collect()
    }
}

fn terminal_error(run_id: Uuid, exists: bool) -> Error {
    if exists {
        Error::InvalidState(format!("Extraction run {} is already terminal", run_id))
    } else {
        Error::NotFound(format!("Extraction run {} not found", run_id))
    }
}

pub(crate) fn run_from_row(row: &SqliteRow) -> Result<ExtractionRun> {
    let status: String = row.try_get("status")?;
    Ok(ExtractionRun {
        id: row.try_get("id")?,
        file_id: row.try_get("file_id")?,
        status: status.parse().map_err(Error::Internal)?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        error: row.try_get("error")?,
    })
}
