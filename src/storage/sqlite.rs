//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers are not blocked while a flusher writes
//! - **Connection pooling**: Both flushers share one pool
//!
//! Timestamps are stored as Unix milliseconds, durations as seconds (`REAL`).

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{Batch, ErrorRow, ResultRow, TableNames};

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
    tables: TableNames,
}

impl SqliteBackend {
    /// Open (or create) the database file and make sure both tables exist
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use web_monitoring::storage::{TableNames, sqlite::SqliteBackend};
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./monitoring.db", TableNames::default()).await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>, tables: TableNames) -> StorageResult<Self> {
        tables.validate()?;

        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        info!("SQLite connection pool created");

        let backend = Self {
            pool,
            db_path: db_path_str,
            tables,
        };
        backend.init_tables().await?;

        Ok(backend)
    }

    async fn init_tables(&self) -> StorageResult<()> {
        debug!(
            "creating tables {} and {}",
            self.tables.results, self.tables.errors
        );

        let results = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                status_code INTEGER NOT NULL,
                pattern_matched INTEGER,
                timestamp INTEGER NOT NULL,
                duration REAL NOT NULL
            )
            "#,
            self.tables.results
        );

        let errors = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                error TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )
            "#,
            self.tables.errors
        );

        for sql in [results, errors] {
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::SchemaFailed(e.to_string()))?;
        }

        Ok(())
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> StorageResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| StorageError::DecodeError(format!("timestamp {millis} out of range")))
    }

    fn result_row(row: SqliteRow) -> StorageResult<ResultRow> {
        let status_code: i64 = row.get("status_code");
        Ok(ResultRow {
            id: row.get("id"),
            url: row.get("url"),
            status_code: u16::try_from(status_code).map_err(|_| {
                StorageError::DecodeError(format!("status code {status_code} out of range"))
            })?,
            pattern_matched: row.get("pattern_matched"),
            timestamp: Self::millis_to_timestamp(row.get("timestamp"))?,
            duration: row.get("duration"),
        })
    }

    fn error_row(row: SqliteRow) -> StorageResult<ErrorRow> {
        Ok(ErrorRow {
            id: row.get("id"),
            url: row.get("url"),
            error: row.get("error"),
            timestamp: Self::millis_to_timestamp(row.get("timestamp"))?,
        })
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self, batch), fields(table = %batch.kind(), count = batch.len()))]
    async fn insert(&self, batch: Batch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        debug!("inserting {} rows into SQLite", batch.len());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        match batch {
            Batch::Results(outcomes) => {
                let sql = format!(
                    "INSERT INTO {} (url, status_code, pattern_matched, timestamp, duration) VALUES (?, ?, ?, ?, ?)",
                    self.tables.results
                );

                for outcome in outcomes {
                    sqlx::query(&sql)
                        .bind(&outcome.url)
                        .bind(i64::from(outcome.status_code))
                        .bind(outcome.pattern_matched)
                        .bind(Self::timestamp_to_millis(&outcome.timestamp))
                        .bind(outcome.duration.as_secs_f64())
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;
                }
            }
            Batch::Errors(failures) => {
                let sql = format!(
                    "INSERT INTO {} (url, error, timestamp) VALUES (?, ?, ?)",
                    self.tables.errors
                );

                for failure in failures {
                    sqlx::query(&sql)
                        .bind(&failure.url)
                        .bind(&failure.error_description)
                        .bind(Self::timestamp_to_millis(&failure.timestamp))
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        debug!("batch insert complete");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn latest_results(&self, url: &str, limit: usize) -> StorageResult<Vec<ResultRow>> {
        let sql = format!(
            r#"
            SELECT id, url, status_code, pattern_matched, timestamp, duration
            FROM {}
            WHERE url = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
            self.tables.results
        );

        let rows = sqlx::query(&sql)
            .bind(url)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        let mut results = rows
            .into_iter()
            .map(Self::result_row)
            .collect::<StorageResult<Vec<_>>>()?;
        // Reverse to get chronological order (oldest first)
        results.reverse();
        Ok(results)
    }

    #[instrument(skip(self))]
    async fn latest_errors(&self, url: &str, limit: usize) -> StorageResult<Vec<ErrorRow>> {
        let sql = format!(
            r#"
            SELECT id, url, error, timestamp
            FROM {}
            WHERE url = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
            self.tables.errors
        );

        let rows = sqlx::query(&sql)
            .bind(url)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        let mut errors = rows
            .into_iter()
            .map(Self::error_row)
            .collect::<StorageResult<Vec<_>>>()?;
        errors.reverse();
        Ok(errors)
    }

    #[instrument(skip(self))]
    async fn drop_tables(&self) -> StorageResult<()> {
        info!(
            "dropping tables {} and {}",
            self.tables.results, self.tables.errors
        );

        for table in [&self.tables.results, &self.tables.errors] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::SchemaFailed(e.to_string()))?;
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
