//! Draft materializer and draft record repository.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use intake_core::{DraftField, DraftPayload, DraftRecord, DraftStatus, Error, Result};

use crate::fields::list_for_run_tx;

const DRAFT_COLUMNS: &str =
    "id, file_id, extraction_run_id, status, payload, created_at, updated_at";

/// SQLite draft repository.
#[derive(Clone)]
pub struct DraftRepository {
    pool: SqlitePool,
}

impl DraftRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Snapshot the latest completed run of a file into a new draft.
    ///
    /// Run selection, field snapshot and insert share one transaction. Every
    /// call creates a new draft, even when nothing changed since the last one.
    ///
    /// # Errors
    ///
    /// `NoCompletedExtraction` when the file (live or not) has no completed
    /// run; no draft is created in that case.
    pub async fn materialize(&self, file_id: Uuid) -> Result<DraftRecord> {
        let mut tx = self.pool.begin().await?;

        let source = sqlx::query(
            r#"SELECT r.id AS run_id, f.original_name AS original_name
               FROM extraction_run r
               JOIN stored_file f ON f.id = r.file_id
               WHERE r.file_id = ? AND r.status = 'completed' AND f.status = 'pending'
               ORDER BY r.completed_at DESC, r.rowid DESC
               LIMIT 1"#,
        )
        .bind(file_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(source) = source else {
            tx.rollback().await?;
            return Err(Error::NoCompletedExtraction(file_id));
        };
        let run_id: Uuid = source.try_get("run_id")?;
        let source_file_name: String = source.try_get("original_name")?;

        let fields = list_for_run_tx(&mut tx, run_id).await?;
        let payload = DraftPayload {
            source_file_name,
            extraction_run_id: run_id,
            fields: fields.iter().map(DraftField::from).collect(),
        };

        let id = Uuid::now_v7();
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO draft_record
               (id, file_id, extraction_run_id, status, payload, created_at, updated_at)
               VALUES (?, ?, ?, 'draft', ?, ?, ?)"#,
        )
        .bind(id)
        .bind(file_id)
        .bind(run_id)
        .bind(Json(&payload))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            subsystem = "database",
            component = "drafts",
            op = "materialize",
            draft_id = %id,
            file_id = %file_id,
            run_id = %run_id,
            field_count = payload.fields.len(),
            "Draft materialized"
        );

        Ok(DraftRecord {
            id,
            file_id,
            extraction_run_id: run_id,
            status: DraftStatus::Draft,
            payload,
            created_at: now,
            updated_at: now,
        })
    }

    /// All drafts, newest first.
    pub async fn list(&self) -> Result<Vec<DraftRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM draft_record ORDER BY created_at DESC, rowid DESC",
            DRAFT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(draft_from_row).collect()
    }

    /// Get a draft by ID.
    pub async fn get(&self, id: Uuid) -> Result<DraftRecord> {
        sqlx::query(&format!(
            "SELECT {} FROM draft_record WHERE id = ?",
            DRAFT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| draft_from_row(&row))
        .transpose()?
        .ok_or_else(|| Error::NotFound(format!("Draft {} not found", id)))
    }
}

fn draft_from_row(row: &SqliteRow) -> Result<DraftRecord> {
    let status: String = row.try_get("status")?;
    let Json(payload): Json<DraftPayload> = row.try_get("payload")?;
    Ok(DraftRecord {
        id: row.try_get("id")?,
        file_id: row.try_get("file_id")?,
        extraction_run_id: row.try_get("extraction_run_id")?,
        status: status.parse().map_err(Error::Internal)?,
        payload,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
