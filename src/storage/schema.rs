//! Persisted record shapes and table naming
//!
//! Two tables are written:
//!
//! - **results**: `(url, status_code, pattern_matched, timestamp, duration)`
//! - **errors**: `(url, error, timestamp)`
//!
//! Table names come from the configuration, so they are validated as plain
//! SQL identifiers before they are ever spliced into a statement.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{StorageError, StorageResult};
use crate::{ProbeFailure, ProbeOutcome};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern is valid")
});

/// Destination table of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Result,
    Error,
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableKind::Result => write!(f, "result"),
            TableKind::Error => write!(f, "error"),
        }
    }
}

/// An ordered batch of records bound for one table
#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    Results(Vec<ProbeOutcome>),
    Errors(Vec<ProbeFailure>),
}

impl Batch {
    pub fn kind(&self) -> TableKind {
        match self {
            Batch::Results(_) => TableKind::Result,
            Batch::Errors(_) => TableKind::Error,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Batch::Results(rows) => rows.len(),
            Batch::Errors(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A record type that can be handed to the sink as a batch
pub trait Record: Send + Sized + 'static {
    const KIND: TableKind;

    fn into_batch(records: Vec<Self>) -> Batch;
}

impl Record for ProbeOutcome {
    const KIND: TableKind = TableKind::Result;

    fn into_batch(records: Vec<Self>) -> Batch {
        Batch::Results(records)
    }
}

impl Record for ProbeFailure {
    const KIND: TableKind = TableKind::Error;

    fn into_batch(records: Vec<Self>) -> Batch {
        Batch::Errors(records)
    }
}

/// Names of the two destination tables
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableNames {
    #[serde(default = "crate::util::get_result_table")]
    pub results: String,

    #[serde(default = "crate::util::get_error_table")]
    pub errors: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            results: crate::util::get_result_table(),
            errors: crate::util::get_error_table(),
        }
    }
}

impl TableNames {
    pub fn new(results: impl Into<String>, errors: impl Into<String>) -> Self {
        Self {
            results: results.into(),
            errors: errors.into(),
        }
    }

    /// Check that both names are usable as unquoted SQL identifiers
    pub fn validate(&self) -> StorageResult<()> {
        for name in [&self.results, &self.errors] {
            if !IDENTIFIER.is_match(name) {
                return Err(StorageError::InvalidConfig(format!(
                    "invalid table name '{name}'"
                )));
            }
        }

        if self.results == self.errors {
            return Err(StorageError::InvalidConfig(format!(
                "result and error tables must differ (both are '{}')",
                self.results
            )));
        }

        Ok(())
    }

    pub fn name_of(&self, kind: TableKind) -> &str {
        match kind {
            TableKind::Result => &self.results,
            TableKind::Error => &self.errors,
        }
    }
}

/// A stored row of the results table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub id: i64,
    pub url: String,
    pub status_code: u16,
    pub pattern_matched: Option<bool>,
    pub timestamp: DateTime<Utc>,

    /// Seconds
    pub duration: f64,
}

/// A stored row of the errors table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRow {
    pub id: i64,
    pub url: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl ResultRow {
    pub fn from_outcome(id: i64, outcome: &ProbeOutcome) -> Self {
        Self {
            id,
            url: outcome.url.clone(),
            status_code: outcome.status_code,
            pattern_matched: outcome.pattern_matched,
            timestamp: outcome.timestamp,
            duration: outcome.duration.as_secs_f64(),
        }
    }
}

impl ErrorRow {
    pub fn from_failure(id: i64, failure: &ProbeFailure) -> Self {
        Self {
            id,
            url: failure.url.clone(),
            error: failure.error_description.clone(),
            timestamp: failure.timestamp,
        }
    }
}
