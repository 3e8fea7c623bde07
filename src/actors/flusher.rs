//! FlusherActor - Periodically drains a stream into the persistence sink
//!
//! ## Batching Strategy
//!
//! Every `period` the flusher takes everything currently queued on its stream
//! in one atomic drain and hands it to the backend in a single `insert` call.
//! Empty cycles never touch the backend. Items pushed while a batch is being
//! persisted wait for the next cycle.
//!
//! ## Failure Policy
//!
//! A batch the backend rejects is never requeued. With
//! [`FlushFailurePolicy::Halt`] the error stops the flusher (and with it the
//! whole pipeline); with [`FlushFailurePolicy::Discard`] it is logged and the
//! flusher keeps going.
//!
//! ## Stopping
//!
//! A flusher stops on a `watch` signal, checked only while it sleeps. The
//! owner can then run one last [`FlusherActor::flush_once`] without losing a
//! batch that was still being written.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, error, instrument, trace};

use crate::error::PipelineError;
use crate::storage::{Record, StorageBackend};
use crate::stream::OutcomeStream;

/// What a flusher does when the backend rejects a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushFailurePolicy {
    /// Drop the batch and stop the pipeline with the storage error
    #[default]
    Halt,

    /// Drop the batch, log the error and keep flushing
    Discard,
}

/// Actor that drains one stream into the backend
pub struct FlusherActor<T: Record> {
    stream: OutcomeStream<T>,
    backend: Arc<dyn StorageBackend>,
    period: Duration,
    policy: FlushFailurePolicy,

    /// Number of batches persisted successfully
    flush_count: u64,

    _record: PhantomData<fn() -> T>,
}

impl<T: Record> FlusherActor<T> {
    pub fn new(
        stream: OutcomeStream<T>,
        backend: Arc<dyn StorageBackend>,
        period: Duration,
        policy: FlushFailurePolicy,
    ) -> Self {
        Self {
            stream,
            backend,
            period,
            policy,
            flush_count: 0,
            _record: PhantomData,
        }
    }

    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    /// Run the actor's main loop
    ///
    /// Returns `Ok` once `stop` fires (or its sender is dropped). The signal
    /// is only checked between cycles, so an insert in progress always runs
    /// to completion first. Otherwise returns on a stream failure or, under
    /// the `Halt` policy, on the first rejected batch.
    #[instrument(skip_all, fields(stream = %T::KIND))]
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Result<(), PipelineError> {
        debug!("starting flusher (period {:?}, policy {:?})", self.period, self.policy);

        loop {
            if *stop.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.period) => {}
                _ = stop.changed() => break,
            }

            self.flush_once().await?;
        }

        debug!("flusher stopped after {} batches", self.flush_count);
        Ok(())
    }

    /// Drain the stream once and persist the batch
    ///
    /// Returns the number of records persisted (0 for an empty stream or a
    /// discarded batch).
    pub async fn flush_once(&mut self) -> Result<usize, PipelineError> {
        let batch = self.stream.drain()?;
        if batch.is_empty() {
            trace!("{} stream empty, nothing to flush", T::KIND);
            return Ok(0);
        }

        let batch_size = batch.len();
        debug!("flushing {} {} records to backend", batch_size, T::KIND);

        match self.backend.insert(T::into_batch(batch)).await {
            Ok(()) => {
                self.flush_count += 1;
                trace!(
                    "flush #{} complete ({} records)",
                    self.flush_count, batch_size
                );
                Ok(batch_size)
            }
            Err(e) => match self.policy {
                FlushFailurePolicy::Halt => {
                    error!("failed to flush {} batch of {}: {}", T::KIND, batch_size, e);
                    Err(PipelineError::Storage {
                        table: T::KIND,
                        source: e,
                    })
                }
                FlushFailurePolicy::Discard => {
                    error!(
                        "failed to flush {} batch, discarding {} records: {}",
                        T::KIND,
                        batch_size,
                        e
                    );
                    Ok(0)
                }
            },
        }
    }
}
