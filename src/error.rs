//! Errors that terminate the pipeline

use std::fmt;

use crate::storage::{StorageError, TableKind};
use crate::stream::StreamError;

/// A failure that escapes a pipeline task
///
/// Fetch failures never show up here: they are recorded as `ProbeFailure`s.
#[derive(Debug)]
pub enum PipelineError {
    /// A stream could not be pushed to or drained
    Stream(StreamError),

    /// The persistence sink rejected a batch (the batch is lost)
    Storage {
        table: TableKind,
        source: StorageError,
    },

    /// A task panicked or was cancelled unexpectedly
    Task(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Stream(err) => write!(f, "stream failure: {err}"),
            PipelineError::Storage { table, source } => {
                write!(f, "failed to persist {table} batch: {source}")
            }
            PipelineError::Task(msg) => write!(f, "pipeline task failed: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Stream(err) => Some(err),
            PipelineError::Storage { source, .. } => Some(source),
            PipelineError::Task(_) => None,
        }
    }
}

impl From<StreamError> for PipelineError {
    fn from(err: StreamError) -> Self {
        PipelineError::Stream(err)
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::Task(err.to_string())
    }
}
