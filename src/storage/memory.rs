//! In-memory storage backend (no persistence)
//!
//! Every batch received is kept as-is, in arrival order. Useful for:
//! - Running the monitor without a database (`"backend": "none"`)
//! - Asserting on exactly what the flushers handed to the sink in tests
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Unbounded**: Nothing is ever evicted

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{Batch, ErrorRow, ResultRow};
use crate::{ProbeFailure, ProbeOutcome};

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    batches: Mutex<Vec<Batch>>,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Vec<Batch>>> {
        self.batches
            .lock()
            .map_err(|_| StorageError::BackendError("memory backend lock poisoned".to_string()))
    }

    /// Every batch received so far, in insert order
    pub fn batches(&self) -> Vec<Batch> {
        self.lock().map(|batches| batches.clone()).unwrap_or_default()
    }

    /// Number of `insert` calls received
    pub fn insert_count(&self) -> usize {
        self.lock().map(|batches| batches.len()).unwrap_or(0)
    }

    /// All stored results, flattened in insert order
    pub fn results(&self) -> Vec<ProbeOutcome> {
        self.batches()
            .into_iter()
            .flat_map(|batch| match batch {
                Batch::Results(rows) => rows,
                Batch::Errors(_) => vec![],
            })
            .collect()
    }

    /// All stored failures, flattened in insert order
    pub fn errors(&self) -> Vec<ProbeFailure> {
        self.batches()
            .into_iter()
            .flat_map(|batch| match batch {
                Batch::Errors(rows) => rows,
                Batch::Results(_) => vec![],
            })
            .collect()
    }
}

/// Keep the last `limit` items of `rows`, oldest first
fn tail<T>(mut rows: Vec<T>, limit: usize) -> Vec<T> {
    let skip = rows.len().saturating_sub(limit);
    rows.drain(..skip);
    rows
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn insert(&self, batch: Batch) -> StorageResult<()> {
        debug!("in-memory backend: storing {} {} rows", batch.len(), batch.kind());
        self.lock()?.push(batch);
        Ok(())
    }

    async fn latest_results(&self, url: &str, limit: usize) -> StorageResult<Vec<ResultRow>> {
        let rows = self
            .results()
            .iter()
            .enumerate()
            .filter(|(_, outcome)| outcome.url == url)
            .map(|(i, outcome)| ResultRow::from_outcome(i as i64 + 1, outcome))
            .collect();

        Ok(tail(rows, limit))
    }

    async fn latest_errors(&self, url: &str, limit: usize) -> StorageResult<Vec<ErrorRow>> {
        let rows = self
            .errors()
            .iter()
            .enumerate()
            .filter(|(_, failure)| failure.url == url)
            .map(|(i, failure)| ErrorRow::from_failure(i as i64 + 1, failure))
            .collect();

        Ok(tail(rows, limit))
    }

    async fn drop_tables(&self) -> StorageResult<()> {
        self.lock()?.clear();
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let stored = self.lock()?.iter().map(Batch::len).sum::<usize>();

        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("stored_rows".to_string(), stored.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
