//! Pipeline orchestration
//!
//! A [`Pipeline`] owns the two streams and runs one poller per target plus
//! the result and error flushers, all on a single `JoinSet`. The whole group
//! is one failure domain: the first task that fails aborts every sibling and
//! its error is returned.
//!
//! The pipeline otherwise runs forever. [`Pipeline::run_until`] additionally
//! stops on an external signal and performs one final flush of both streams.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::actors::{FlushFailurePolicy, FlusherActor, PollerActor};
use crate::error::PipelineError;
use crate::fetcher::Fetcher;
use crate::storage::StorageBackend;
use crate::stream::OutcomeStream;
use crate::{ProbeFailure, ProbeOutcome, Target};

/// Default period between two flushes of the same stream
pub const DEFAULT_FLUSH_PERIOD: Duration = Duration::from_secs(3);

/// Flush settings shared by both flushers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub result_flush_period: Duration,
    pub error_flush_period: Duration,
    pub failure_policy: FlushFailurePolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            result_flush_period: DEFAULT_FLUSH_PERIOD,
            error_flush_period: DEFAULT_FLUSH_PERIOD,
            failure_policy: FlushFailurePolicy::Halt,
        }
    }
}

/// Poll → buffer → batch-flush pipeline
pub struct Pipeline {
    targets: Vec<Target>,
    fetcher: Arc<dyn Fetcher>,
    backend: Arc<dyn StorageBackend>,
    settings: PipelineSettings,
    results: OutcomeStream<ProbeOutcome>,
    errors: OutcomeStream<ProbeFailure>,
}

impl Pipeline {
    pub fn new(
        targets: Vec<Target>,
        fetcher: Arc<dyn Fetcher>,
        backend: Arc<dyn StorageBackend>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            targets,
            fetcher,
            backend,
            settings,
            results: OutcomeStream::new("result"),
            errors: OutcomeStream::new("error"),
        }
    }

    /// Handle onto the result stream
    pub fn result_stream(&self) -> OutcomeStream<ProbeOutcome> {
        self.results.clone()
    }

    /// Handle onto the error stream
    pub fn error_stream(&self) -> OutcomeStream<ProbeFailure> {
        self.errors.clone()
    }

    /// Spawn every task onto one set
    ///
    /// Returns the set, the pollers' abort handles and the flushers' stop signal.
    fn spawn_all(
        &self,
    ) -> (
        JoinSet<Result<(), PipelineError>>,
        Vec<AbortHandle>,
        watch::Sender<bool>,
    ) {
        let mut tasks = JoinSet::new();
        let (stop_tx, stop_rx) = watch::channel(false);

        let pollers = self
            .targets
            .iter()
            .map(|target| {
                let poller = PollerActor::new(
                    target.clone(),
                    Arc::clone(&self.fetcher),
                    self.results.clone(),
                    self.errors.clone(),
                );
                tasks.spawn(poller.run())
            })
            .collect();

        let result_flusher = FlusherActor::new(
            self.results.clone(),
            Arc::clone(&self.backend),
            self.settings.result_flush_period,
            self.settings.failure_policy,
        );
        let error_flusher = FlusherActor::new(
            self.errors.clone(),
            Arc::clone(&self.backend),
            self.settings.error_flush_period,
            self.settings.failure_policy,
        );
        tasks.spawn(result_flusher.run(stop_rx.clone()));
        tasks.spawn(error_flusher.run(stop_rx));

        (tasks, pollers, stop_tx)
    }

    /// Run every poller and both flushers until one of them fails
    pub async fn run(self) -> Result<(), PipelineError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run until a task fails or `shutdown` resolves
    ///
    /// On shutdown the pollers are aborted (in-flight fetches are dropped),
    /// the flushers finish any insert they are in the middle of and stop, and
    /// whatever is left on the streams is flushed once. On failure nothing is
    /// flushed: the failing task's error is returned as is.
    #[instrument(skip_all, fields(targets = self.targets.len()))]
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), PipelineError>
    where
        F: Future<Output = ()>,
    {
        info!("starting pipeline with {} targets", self.targets.len());

        let (mut tasks, pollers, stop) = self.spawn_all();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    match joined {
                        Some(Ok(Ok(()))) => debug!("pipeline task finished"),
                        Some(Ok(Err(e))) => {
                            error!("pipeline task failed: {e}");
                            tasks.abort_all();
                            return Err(e);
                        }
                        Some(Err(e)) => {
                            error!("pipeline task panicked: {e}");
                            tasks.abort_all();
                            return Err(e.into());
                        }
                        None => {
                            warn!("all pipeline tasks finished");
                            return Ok(());
                        }
                    }
                }

                _ = &mut shutdown => {
                    info!("shutdown requested, stopping pipeline");
                    for poller in &pollers {
                        poller.abort();
                    }
                    // Receivers only go away with their flushers
                    let _ = stop.send(true);

                    Self::drain_tasks(&mut tasks).await?;
                    return self.final_flush().await;
                }
            }
        }
    }

    /// Wait for every task after a shutdown, surfacing real failures
    async fn drain_tasks(
        tasks: &mut JoinSet<Result<(), PipelineError>>,
    ) -> Result<(), PipelineError> {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Err(e) if e.is_cancelled() => {}
                Ok(Err(e)) => {
                    error!("pipeline task failed during shutdown: {e}");
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    error!("pipeline task panicked during shutdown: {e}");
                    tasks.abort_all();
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    /// Persist whatever is still queued on both streams, once
    async fn final_flush(&self) -> Result<(), PipelineError> {
        let mut results = FlusherActor::new(
            self.results.clone(),
            Arc::clone(&self.backend),
            self.settings.result_flush_period,
            self.settings.failure_policy,
        );
        let mut errors = FlusherActor::new(
            self.errors.clone(),
            Arc::clone(&self.backend),
            self.settings.error_flush_period,
            self.settings.failure_policy,
        );

        let flushed_results = results.flush_once().await?;
        let flushed_errors = errors.flush_once().await?;
        info!(
            "final flush complete ({} results, {} errors)",
            flushed_results, flushed_errors
        );

        Ok(())
    }
}
