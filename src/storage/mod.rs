//! Persistence sinks for probe records
//!
//! The flushers only see the [`StorageBackend`] trait and hand it whole
//! batches, one `insert` call per flush.
//!
//! ## Backends
//!
//! - **SQLite** (`storage-sqlite`): Embedded database file
//! - **PostgreSQL** (`storage-postgres`): External server, shared by many readers
//! - **In-Memory**: No persistence, for running without a database and for tests
//!
//! ## Usage
//!
//! ```no_run
//! use web_monitoring::storage::{StorageBackend, TableNames, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./monitoring.db", TableNames::default()).await?;
//!     println!("{}", backend.health_check().await?.message);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-postgres")]
pub mod postgres;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use schema::{Batch, ErrorRow, Record, ResultRow, TableKind, TableNames};
