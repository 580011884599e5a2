//! Field store: values produced by completed extraction runs.
//!
//! Fields are written once, inside the transaction that completes their run,
//! and never updated. `ordinal` preserves the order the service returned them.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use intake_core::{Error, ExtractedField, NewExtractedField, Result};

/// SQLite field store repository.
#[derive(Clone)]
pub struct FieldRepository {
    pool: SqlitePool,
}

impl FieldRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fields of a run in insertion order.
    pub async fn list_for_run(&self, run_id: Uuid) -> Result<Vec<ExtractedField>> {
        let rows = sqlx::query(
            r#"SELECT id, run_id, field_code, value, value_type, confidence, provenance
               FROM extraction_field
               WHERE run_id = ?
               ORDER BY ordinal"#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(field_from_row).collect()
    }
}

/// Bulk insert within the caller's transaction.
pub(crate) async fn insert_for_run(
    tx: &mut Transaction<'_, Sqlite>,
    run_id: Uuid,
    fields: &[NewExtractedField],
) -> Result<()> {
    for (ordinal, field) in fields.iter().enumerate() {
        sqlx::query(
            r#"INSERT INTO extraction_field
               (id, run_id, ordinal, field_code, value, value_type, confidence, provenance)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(Uuid::now_v7())
        .bind(run_id)
        .bind(ordinal as i64)
        .bind(&field.field_code)
        .bind(field.value.to_stored())
        .bind(field.value.value_type().to_string())
        .bind(field.confidence)
        .bind(&field.provenance)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Fields of a run, read inside a transaction.
pub(crate) async fn list_for_run_tx(
    tx: &mut Transaction<'_, Sqlite>,
    run_id: Uuid,
) -> Result<Vec<ExtractedField>> {
    let rows = sqlx::query(
        r#"SELECT id, run_id, field_code, value, value_type, confidence, provenance
           FROM extraction_field
           WHERE run_id = ?
           ORDER BY ordinal"#,
    )
    .bind(run_id)
    .fetch_all(&mut **tx)
    .await?;
    rows.iter().map(field_from_row).collect()
}

fn field_from_row(row: &SqliteRow) -> Result<ExtractedField> {
    let value_type: String = row.try_get("value_type")?;
    Ok(ExtractedField {
        id: row.try_get("id")?,
        run_id: row.try_get("run_id")?,
        field_code: row.try_get("field_code")?,
        value: row.try_get("value")?,
        value_type: value_type.parse().map_err(Error::Internal)?,
        confidence: row.try_get("confidence")?,
        provenance: row.try_get("provenance")?,
    })
}
