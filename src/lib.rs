pub mod actors;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod pipeline;
pub mod storage;
pub mod stream;
pub mod util;

use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

/// One monitored endpoint.
///
/// Built once from the configuration and never changed afterwards. Each target
/// is owned by exactly one poller.
#[derive(Debug, Clone)]
pub struct Target {
    pub url: String,

    /// Configured polling cadence
    pub interval: Duration,

    /// Per-request bound for connecting and reading the body
    pub timeout: Duration,

    /// Content pattern searched in the response body (dot matches newline)
    pub pattern: Option<Regex>,
}

/// A probe that produced an HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub url: String,

    /// When the request was started
    pub timestamp: DateTime<Utc>,

    /// Wall-clock time spent on the request, including the full body read
    pub duration: Duration,

    pub status_code: u16,

    /// `None` when the target has no pattern configured
    pub pattern_matched: Option<bool>,
}

/// A probe that did not produce a usable response.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeFailure {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub duration: Duration,

    /// "classification: message", e.g. `connect: tcp connect error: Connection refused`
    pub error_description: String,
}

/// Result of a single fetch. Every fetch yields exactly one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(ProbeOutcome),
    Failure(ProbeFailure),
}

impl Outcome {
    pub fn url(&self) -> &str {
        match self {
            Outcome::Success(outcome) => &outcome.url,
            Outcome::Failure(failure) => &failure.url,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Outcome::Success(outcome) => outcome.duration,
            Outcome::Failure(failure) => failure.duration,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}
