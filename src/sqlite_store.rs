//! SQLite-backed [`RecordStore`] implementation.
//!
//! Each `append` is a single auto-committed `INSERT`, so a record is
//! durable by the time its id is returned. Ids come from the table's
//! `AUTOINCREMENT` key and are never reused.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use remedy_core::{Error, NewRecord, Record, RecordId, RecordStore, Result};

/// SQLite implementation of the [`RecordStore`] trait.
///
/// Expects the schema created by [`crate::migrate::apply`].
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn storage(e: sqlx::Error) -> Error {
    Error::Storage(e.to_string())
}

fn row_to_record(row: &SqliteRow) -> Result<Record> {
    let id: i64 = row.try_get("id").map_err(storage)?;
    let created_ms: i64 = row.try_get("created_at").map_err(storage)?;
    let created_at: DateTime<Utc> = DateTime::from_timestamp_millis(created_ms)
        .ok_or_else(|| Error::Storage(format!("record {} has invalid created_at", id)))?;

    Ok(Record {
        id: id as RecordId,
        error_text: row.try_get("error_text").map_err(storage)?,
        solution_text: row.try_get("solution_text").map_err(storage)?,
        confidence: row.try_get("confidence").map_err(storage)?,
        source: row.try_get("source").map_err(storage)?,
        created_at,
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn append(&self, record: NewRecord) -> Result<RecordId> {
        record.validate()?;

        let result = sqlx::query(
            r#"
            INSERT INTO records (error_text, solution_text, confidence, source, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.error_text)
        .bind(&record.solution_text)
        .bind(record.confidence)
        .bind(&record.source)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(result.last_insert_rowid() as RecordId)
    }

    async fn get(&self, id: RecordId) -> Result<Record> {
        let key = i64::try_from(id).map_err(|_| Error::NotFound(id))?;
        let row = sqlx::query(
            "SELECT id, error_text, solution_text, confidence, source, created_at FROM records WHERE id = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        match row {
            Some(row) => row_to_record(&row),
            None => Err(Error::NotFound(id)),
        }
    }

    async fn all(&self) -> Result<Vec<Record>> {
        let rows = sqlx::query(
            "SELECT id, error_text, solution_text, confidence, source, created_at FROM records ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(row_to_record).collect()
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(n as usize)
    }
}
