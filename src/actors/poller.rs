//! PollerActor - Probes one target on a self-correcting schedule
//!
//! ## Message Flow
//!
//! ```text
//! sleep(next) → fetch → Outcome ─┬─ Success → result stream
//!      ↑                         └─ Failure → error stream
//!      └──── next = max(100ms, interval − fetch duration)
//! ```
//!
//! Fetch failures are data, not errors: they land on the error stream and the
//! loop carries on. Only a broken stream stops a poller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, trace, warn};

use crate::error::PipelineError;
use crate::fetcher::Fetcher;
use crate::stream::{OutcomeStream, StreamError};
use crate::{Outcome, ProbeFailure, ProbeOutcome, Target};

/// Shortest pause between two fetches of the same target
pub const MIN_SLEEP: Duration = Duration::from_millis(100);

/// Time to wait before the next fetch, given how long the last one took
///
/// `max(0.1s, interval − elapsed)`: keeps the cadence close to `interval`
/// while guaranteeing a pause when a target is slower than its interval.
pub fn next_sleep(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed).max(MIN_SLEEP)
}

/// Actor that polls a single target forever
pub struct PollerActor {
    target: Target,
    fetcher: Arc<dyn Fetcher>,
    results: OutcomeStream<ProbeOutcome>,
    errors: OutcomeStream<ProbeFailure>,
}

impl PollerActor {
    pub fn new(
        target: Target,
        fetcher: Arc<dyn Fetcher>,
        results: OutcomeStream<ProbeOutcome>,
        errors: OutcomeStream<ProbeFailure>,
    ) -> Self {
        Self {
            target,
            fetcher,
            results,
            errors,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Run the actor's main loop
    ///
    /// Never returns `Ok`; the task is stopped by aborting it. Returns an error
    /// only when an outcome cannot be appended to its stream.
    #[instrument(skip(self), fields(url = %self.target.url))]
    pub async fn run(self) -> Result<(), PipelineError> {
        debug!(
            "starting poller (interval {:?}, timeout {:?})",
            self.target.interval, self.target.timeout
        );

        loop {
            let elapsed = self.poll_once().await?;
            let pause = next_sleep(self.target.interval, elapsed);

            trace!("fetch took {elapsed:?}, sleeping {pause:?}");
            tokio::time::sleep(pause).await;
        }
    }

    /// Perform one fetch and route its outcome
    ///
    /// Returns how long the fetch took.
    pub async fn poll_once(&self) -> Result<Duration, StreamError> {
        let outcome = self
            .fetcher
            .fetch(&self.target, self.target.timeout)
            .await;
        let elapsed = outcome.duration();

        match outcome {
            Outcome::Success(result) => {
                trace!(
                    "status {} (pattern matched: {:?})",
                    result.status_code, result.pattern_matched
                );
                self.results.push(result)?;
            }
            Outcome::Failure(failure) => {
                warn!("probe failed: {}", failure.error_description);
                self.errors.push(failure)?;
            }
        }

        Ok(elapsed)
    }
}
