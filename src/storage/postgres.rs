//! PostgreSQL storage backend implementation
//!
//! Same contract as the SQLite backend, for deployments that already run a
//! PostgreSQL server. Timestamps are stored as `TIMESTAMPTZ`.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{Batch, ErrorRow, ResultRow, TableNames};

/// Connection parameters for a PostgreSQL server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgConnection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// PostgreSQL storage backend
pub struct PostgresBackend {
    pool: Pool<Postgres>,
    database: String,
    tables: TableNames,
}

impl PostgresBackend {
    /// Connect to the server and make sure both tables exist
    #[instrument(skip_all, fields(host = %connection.host, database = %connection.database))]
    pub async fn new(connection: &PgConnection, tables: TableNames) -> StorageResult<Self> {
        tables.validate()?;

        info!(
            "connecting to PostgreSQL at {}:{}",
            connection.host, connection.port
        );

        let options = PgConnectOptions::new()
            .host(&connection.host)
            .port(connection.port)
            .username(&connection.user)
            .password(&connection.password)
            .database(&connection.database);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        info!("PostgreSQL connection pool created");

        let backend = Self {
            pool,
            database: connection.database.clone(),
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
                id BIGSERIAL PRIMARY KEY,
                url TEXT NOT NULL,
                status_code INT NOT NULL,
                pattern_matched BOOL,
                timestamp TIMESTAMPTZ NOT NULL,
                duration DOUBLE PRECISION NOT NULL
            )
            "#,
            self.tables.results
        );

        let errors = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                url TEXT NOT NULL,
                error TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL
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

    fn result_row(row: PgRow) -> StorageResult<ResultRow> {
        let status_code: i32 = row.get("status_code");
        Ok(ResultRow {
            id: row.get("id"),
            url: row.get("url"),
            status_code: u16::try_from(status_code).map_err(|_| {
                StorageError::DecodeError(format!("status code {status_code} out of range"))
            })?,
            pattern_matched: row.get("pattern_matched"),
            timestamp: row.get("timestamp"),
            duration: row.get("duration"),
        })
    }

    fn error_row(row: PgRow) -> ErrorRow {
        ErrorRow {
            id: row.get("id"),
            url: row.get("url"),
            error: row.get("error"),
            timestamp: row.get("timestamp"),
        }
    }
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    #[instrument(skip(self, batch), fields(table = %batch.kind(), count = batch.len()))]
    async fn insert(&self, batch: Batch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        debug!("inserting {} rows into PostgreSQL", batch.len());

        let mut tx = self.pool.begin().await?;

        match batch {
            Batch::Results(outcomes) => {
                let sql = format!(
                    "INSERT INTO {} (url, status_code, pattern_matched, timestamp, duration) VALUES ($1, $2, $3, $4, $5)",
                    self.tables.results
                );

                for outcome in outcomes {
                    sqlx::query(&sql)
                        .bind(&outcome.url)
                        .bind(i32::from(outcome.status_code))
                        .bind(outcome.pattern_matched)
                        .bind(outcome.timestamp)
                        .bind(outcome.duration.as_secs_f64())
                        .execute(&mut *tx)
                        .await?;
                }
            }
            Batch::Errors(failures) => {
                let sql = format!(
                    "INSERT INTO {} (url, error, timestamp) VALUES ($1, $2, $3)",
                    self.tables.errors
                );

                for failure in failures {
                    sqlx::query(&sql)
                        .bind(&failure.url)
                        .bind(&failure.error_description)
                        .bind(failure.timestamp)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;

        debug!("batch insert complete");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn latest_results(&self, url: &str, limit: usize) -> StorageResult<Vec<ResultRow>> {
        let sql = format!(
            r#"
            SELECT id, url, status_code, pattern_matched, timestamp, duration
            FROM {}
            WHERE url = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
            self.tables.results
        );

        let rows = sqlx::query(&sql)
            .bind(url)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut results = rows
            .into_iter()
            .map(Self::result_row)
            .collect::<StorageResult<Vec<_>>>()?;
        results.reverse();
        Ok(results)
    }

    #[instrument(skip(self))]
    async fn latest_errors(&self, url: &str, limit: usize) -> StorageResult<Vec<ErrorRow>> {
        let sql = format!(
            r#"
            SELECT id, url, error, timestamp
            FROM {}
            WHERE url = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
            self.tables.errors
        );

        let rows = sqlx::query(&sql)
            .bind(url)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut errors: Vec<ErrorRow> = rows.into_iter().map(Self::error_row).collect();
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
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "PostgreSQL backend operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "postgres".to_string()),
                    ("database".to_string(), self.database.clone()),
                ]),
            }),
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
        info!("closing PostgreSQL backend");
        self.pool.close().await;
        Ok(())
    }
}
