//! Single-shot HTTP probing
//!
//! A fetch issues one GET against a target, reads the whole body and turns
//! whatever happened into exactly one [`Outcome`]. Network errors, timeouts
//! and undecodable bodies become [`ProbeFailure`]s; nothing is propagated to
//! the caller.
//!
//! ## Timing
//!
//! `timestamp` is taken when the request starts. `duration` covers the full
//! body read, since pollers subtract it from their interval to keep cadence.
//!
//! The fetch timeout is one deadline covering connect, headers and the whole
//! body, not a per-read bound. A body still streaming when it expires is a
//! `timeout` failure.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tracing::{instrument, trace};

use crate::{Outcome, ProbeFailure, ProbeOutcome, Target};

/// Coarse classification of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    Connect,
    Redirect,
    Body,
    Decode,
    Request,
    Http,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::Connect => "connect",
            FetchErrorKind::Redirect => "redirect",
            FetchErrorKind::Body => "body",
            FetchErrorKind::Decode => "decode",
            FetchErrorKind::Request => "request",
            FetchErrorKind::Http => "http",
        };
        f.write_str(name)
    }
}

/// Why a fetch failed, rendered as `"<kind>: <message>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}

/// Join an error with all of its sources, outermost first
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        // hyper and reqwest sometimes repeat the inner message
        if !message.ends_with(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FetchErrorKind::Timeout
        } else if err.is_connect() {
            FetchErrorKind::Connect
        } else if err.is_redirect() {
            FetchErrorKind::Redirect
        } else if err.is_body() {
            FetchErrorKind::Body
        } else if err.is_decode() {
            FetchErrorKind::Decode
        } else if err.is_request() || err.is_builder() {
            FetchErrorKind::Request
        } else {
            FetchErrorKind::Http
        };

        Self {
            kind,
            message: error_chain(&err),
        }
    }
}

impl From<std::str::Utf8Error> for FetchError {
    fn from(err: std::str::Utf8Error) -> Self {
        Self {
            kind: FetchErrorKind::Decode,
            message: format!("response body is not valid UTF-8: {err}"),
        }
    }
}

/// Search `body` for `pattern`
///
/// Returns `Ok(None)` without a pattern (the body is not decoded at all).
pub fn match_pattern(pattern: Option<&Regex>, body: &[u8]) -> Result<Option<bool>, FetchError> {
    match pattern {
        None => Ok(None),
        Some(pattern) => {
            let text = std::str::from_utf8(body)?;
            Ok(Some(pattern.is_match(text)))
        }
    }
}

/// Performs one probe of a target
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `target` once, bounded by `timeout`
    async fn fetch(&self, target: &Target, timeout: Duration) -> Outcome;
}

/// Fetcher backed by a shared `reqwest` client
///
/// Redirects are followed with reqwest's default policy.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher with a shared client
    ///
    /// The client sets no timeouts of its own. Each fetch is bounded by the
    /// timeout passed to [`Fetcher::fetch`], connection setup included.
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().build()?;

        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Send the request, read the whole body and evaluate the pattern
    async fn execute_request(
        &self,
        target: &Target,
        timeout: Duration,
    ) -> Result<(u16, Option<bool>), FetchError> {
        let response = self.client.get(&target.url).timeout(timeout).send().await?;
        let status_code = response.status().as_u16();
        let body = response.bytes().await?;
        let pattern_matched = match_pattern(target.pattern.as_ref(), &body)?;

        Ok((status_code, pattern_matched))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self, target), fields(url = %target.url))]
    async fn fetch(&self, target: &Target, timeout: Duration) -> Outcome {
        let timestamp = Utc::now();
        let start = Instant::now();

        let result = self.execute_request(target, timeout).await;
        let duration = start.elapsed();

        match result {
            Ok((status_code, pattern_matched)) => {
                trace!("status {status_code} in {duration:?}");
                Outcome::Success(ProbeOutcome {
                    url: target.url.clone(),
                    timestamp,
                    duration,
                    status_code,
                    pattern_matched,
                })
            }
            Err(e) => {
                trace!("fetch failed after {duration:?}: {e}");
                Outcome::Failure(ProbeFailure {
                    url: target.url.clone(),
                    timestamp,
                    duration,
                    error_description: e.to_string(),
                })
            }
        }
    }
}
