//! Storage backend trait definition
//!
//! This module defines the `StorageBackend` trait, the persistence sink the
//! flushers write to.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StorageResult;
use super::schema::{Batch, ErrorRow, ResultRow};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for persistence sinks
///
/// The pipeline only ever calls [`StorageBackend::insert`]; the query methods
/// exist for inspection and tests.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`: both flushers share one backend and
/// may call it concurrently. Connection pools serialize access internally.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Persist one batch into the table selected by `batch.kind()`
    ///
    /// Either the whole batch is stored or an error is returned. Row order
    /// follows batch order.
    async fn insert(&self, batch: Batch) -> StorageResult<()>;

    /// The `limit` most recent result rows for `url`, oldest first
    async fn latest_results(&self, url: &str, limit: usize) -> StorageResult<Vec<ResultRow>>;

    /// The `limit` most recent error rows for `url`, oldest first
    async fn latest_errors(&self, url: &str, limit: usize) -> StorageResult<Vec<ErrorRow>>;

    /// Drop both tables
    ///
    /// Used to tear down test databases.
    async fn drop_tables(&self) -> StorageResult<()>;

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend is operational.
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
