use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::types::{NewUpload, SqlValue, UploadLedgerEntry};
use crate::writer::{InsertStatement, MAX_BIND_PARAMS};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store rejected statement: {0}")]
    Rejected(String),
}

/// Reject statements whose parameters do not fill exactly one value per placeholder,
/// or that exceed the Postgres bind limit, before they reach the database.
pub fn check_statement(statement: &InsertStatement) -> Result<(), StoreError> {
    let expected = statement.row_count * statement.kind.column_count();
    if statement.params.len() != expected {
        return Err(StoreError::Rejected(format!(
            "{} parameters for {} rows of {} (expected {})",
            statement.params.len(),
            statement.row_count,
            statement.kind,
            expected
        )));
    }
    if expected > MAX_BIND_PARAMS {
        return Err(StoreError::Rejected(format!("{} bind parameters exceed the limit of {}", expected, MAX_BIND_PARAMS)));
    }
    Ok(())
}

/// Relational store used by the ingestion pipeline
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Display name of an artist, `None` when the id does not resolve
    async fn find_artist_name(&self, artist_id: i64) -> Result<Option<String>, StoreError>;

    /// First release of the artist carrying this ISRC
    async fn find_release_by_isrc(&self, artist_id: i64, isrc: &str) -> Result<Option<i64>, StoreError>;

    /// First release of the artist whose title matches case-insensitively
    async fn find_release_by_title(&self, artist_id: i64, title: &str) -> Result<Option<i64>, StoreError>;

    /// Insert a ledger row with zero records and return its id
    async fn create_upload(&self, upload: &NewUpload) -> Result<i64, StoreError>;

    async fn finalize_upload(&self, upload_id: i64, total_records: i64) -> Result<(), StoreError>;

    async fn list_uploads(&self, limit: i64) -> Result<Vec<UploadLedgerEntry>, StoreError>;

    /// Run one parameterized insert, returning the affected row count
    async fn execute(&self, statement: &InsertStatement) -> Result<u64, StoreError>;
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .context("Failed to connect to Postgres")?;

        info!("✅ Connected to Postgres (max connections: {})", max_connections);
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("🔌 Postgres pool closed");
    }
}

#[async_trait]
impl AnalyticsStore for PgStore {
    async fn find_artist_name(&self, artist_id: i64) -> Result<Option<String>, StoreError> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM artists WHERE id = $1").bind(artist_id).fetch_optional(&self.pool).await?;
        Ok(name)
    }

    async fn find_release_by_isrc(&self, artist_id: i64, isrc: &str) -> Result<Option<i64>, StoreError> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id::bigint FROM releases WHERE artist_id = $1 AND isrc = $2 ORDER BY id LIMIT 1")
            .bind(artist_id)
            .bind(isrc)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn find_release_by_title(&self, artist_id: i64, title: &str) -> Result<Option<i64>, StoreError> {
        let id = sqlx::query_scalar::<_, i64>("SELECT id::bigint FROM releases WHERE artist_id = $1 AND LOWER(title) = LOWER($2) ORDER BY id LIMIT 1")
            .bind(artist_id)
            .bind(title)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn create_upload(&self, upload: &NewUpload) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO analytics_uploads (filename, platform, reporting_date, total_records, uploaded_by, artist_id) \
             VALUES ($1, $2, $3, 0, $4, $5) RETURNING id::bigint",
        )
        .bind(upload.filename.as_str())
        .bind(upload.platform.as_str())
        .bind(upload.reporting_date)
        .bind(upload.uploaded_by)
        .bind(upload.artist_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn finalize_upload(&self, upload_id: i64, total_records: i64) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE analytics_uploads SET total_records = $1 WHERE id = $2").bind(total_records).bind(upload_id).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Rejected(format!("upload {} does not exist", upload_id)));
        }
        Ok(())
    }

    async fn list_uploads(&self, limit: i64) -> Result<Vec<UploadLedgerEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT id::bigint AS id, filename, platform, reporting_date, total_records::bigint AS total_records, \
             uploaded_by::bigint AS uploaded_by, artist_id::bigint AS artist_id, created_at::timestamptz AS created_at \
             FROM analytics_uploads ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(UploadLedgerEntry {
                id: row.try_get("id")?,
                filename: row.try_get("filename")?,
                platform: row.try_get("platform")?,
                reporting_date: row.try_get::<NaiveDate, _>("reporting_date")?,
                total_records: row.try_get("total_records")?,
                uploaded_by: row.try_get("uploaded_by")?,
                artist_id: row.try_get("artist_id")?,
                created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            });
        }
        Ok(entries)
    }

    async fn execute(&self, statement: &InsertStatement) -> Result<u64, StoreError> {
        check_statement(statement)?;

        let mut query = sqlx::query(&statement.sql);
        for value in &statement.params {
            query = match value {
                SqlValue::Int(v) => query.bind(*v),
                SqlValue::Float(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.as_deref()),
                SqlValue::Date(v) => query.bind(*v),
            };
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
