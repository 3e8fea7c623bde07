//! End-to-end pipeline tests
//!
//! These tests verify that:
//! - Outcomes from every target reach the backend through the flushers
//! - A storage failure under `Halt` stops the whole pipeline
//! - `Discard` keeps the pipeline alive through storage failures
//! - Shutdown flushes whatever is still buffered
//! - Shutdown never drops a batch that is still being written
//! - Every completed fetch is persisted exactly once

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use assert_matches::assert_matches;
use web_monitoring::actors::FlushFailurePolicy;
use web_monitoring::error::PipelineError;
use web_monitoring::fetcher::{Fetcher, HttpFetcher};
use web_monitoring::pipeline::{Pipeline, PipelineSettings};
use web_monitoring::storage::{MemoryBackend, StorageBackend, TableKind};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn settings(flush_period: Duration, failure_policy: FlushFailurePolicy) -> PipelineSettings {
    PipelineSettings {
        result_flush_period: flush_period,
        error_flush_period: flush_period,
        failure_policy,
    }
}

#[tokio::test]
async fn test_pipeline_persists_results_and_errors() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("status: ok"))
        .mount(&mock_server)
        .await;

    let ok_url = format!("{}/health", mock_server.uri());
    let down_url = unreachable_url();
    let targets = vec![
        create_target(&ok_url, Duration::from_millis(500), Some("ok")),
        create_target(&down_url, Duration::from_millis(500), None),
    ];

    let backend = Arc::new(MemoryBackend::new());
    let fetcher = Arc::new(HttpFetcher::new().unwrap());
    let pipeline = Pipeline::new(
        targets,
        fetcher,
        Arc::clone(&backend) as Arc<dyn StorageBackend>,
        settings(Duration::from_millis(300), FlushFailurePolicy::Halt),
    );

    pipeline
        .run_until(tokio::time::sleep(Duration::from_millis(2_200)))
        .await
        .unwrap();

    let results = backend.results();
    assert!(results.len() >= 3, "only {} results", results.len());
    for result in &results {
        assert_eq!(result.url, ok_url);
        assert_eq!(result.status_code, 200);
        assert_eq!(result.pattern_matched, Some(true));
    }

    let errors = backend.errors();
    assert!(!errors.is_empty());
    for error in &errors {
        assert_eq!(error.url, down_url);
        assert!(!error.error_description.is_empty());
    }

    // Successive probes of the same target stay close to its interval
    for pair in results.windows(2) {
        let spacing = (pair[1].timestamp - pair[0].timestamp)
            .to_std()
            .unwrap();
        assert!(
            spacing >= Duration::from_millis(400) && spacing <= Duration::from_millis(900),
            "spacing {spacing:?}"
        );
    }

    let latest = backend.latest_results(&ok_url, 2).await.unwrap();
    assert_eq!(latest.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_storage_failure_halts_pipeline() {
    let url = "https://a.example";
    let fetcher = Arc::new(ScriptedFetcher::new().with_script(url, Duration::from_millis(50), false));
    let backend = Arc::new(FailingBackend::default());
    let pipeline = Pipeline::new(
        vec![create_target(url, Duration::from_secs(1), None)],
        fetcher,
        Arc::clone(&backend) as Arc<dyn StorageBackend>,
        settings(Duration::from_secs(3), FlushFailurePolicy::Halt),
    );

    let result = tokio::time::timeout(Duration::from_secs(60), pipeline.run())
        .await
        .expect("pipeline should stop on its own");

    assert_matches!(
        result,
        Err(PipelineError::Storage {
            table: TableKind::Result,
            ..
        })
    );
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_discard_policy_survives_storage_failures() {
    let url = "https://a.example";
    let fetcher = Arc::new(ScriptedFetcher::new().with_script(url, Duration::from_millis(50), false));
    let backend = Arc::new(FailingBackend::default());
    let pipeline = Pipeline::new(
        vec![create_target(url, Duration::from_secs(1), None)],
        fetcher,
        Arc::clone(&backend) as Arc<dyn StorageBackend>,
        settings(Duration::from_secs(3), FlushFailurePolicy::Discard),
    );

    let result = pipeline
        .run_until(tokio::time::sleep(Duration::from_millis(10_500)))
        .await;

    assert!(result.is_ok());
    // Cycles at 3s, 6s, 9s plus the final flush
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_remaining_outcomes() {
    let ok = "https://ok.example";
    let down = "https://down.example";
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with_script(ok, Duration::from_millis(100), false)
            .with_script(down, Duration::from_millis(100), true),
    );
    let backend = Arc::new(MemoryBackend::new());
    let pipeline = Pipeline::new(
        vec![
            create_target(ok, Duration::from_secs(1), None),
            create_target(down, Duration::from_secs(1), None),
        ],
        Arc::clone(&fetcher) as Arc<dyn Fetcher>,
        Arc::clone(&backend) as Arc<dyn StorageBackend>,
        settings(Duration::from_secs(60), FlushFailurePolicy::Halt),
    );
    let results = pipeline.result_stream();
    let errors = pipeline.error_stream();

    pipeline
        .run_until(tokio::time::sleep(Duration::from_millis(4_500)))
        .await
        .unwrap();

    // No periodic flush ran, so everything arrived in the final one
    assert_eq!(backend.insert_count(), 2);
    assert_eq!(backend.results().len(), 5);
    assert_eq!(backend.errors().len(), 5);
    assert!(results.is_empty().unwrap());
    assert!(errors.is_empty().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_insert_keeps_the_batch() {
    let url = "https://a.example";
    let fetcher = Arc::new(ScriptedFetcher::new().with_script(url, Duration::ZERO, false));
    let backend = Arc::new(SlowBackend::new(Duration::from_secs(2)));
    let pipeline = Pipeline::new(
        vec![create_target(url, Duration::from_secs(1), None)],
        Arc::clone(&fetcher) as Arc<dyn Fetcher>,
        Arc::clone(&backend) as Arc<dyn StorageBackend>,
        settings(Duration::from_millis(2_500), FlushFailurePolicy::Halt),
    );

    // Fetches at 0s, 1s, 2s and 3s; the batch drained at 2.5s is written until 4.5s
    pipeline
        .run_until(tokio::time::sleep(Duration::from_millis(3_500)))
        .await
        .unwrap();

    assert_eq!(fetcher.completed(), 4);
    assert_eq!(backend.inner.results().len(), 4);
    assert_eq!(backend.inner.insert_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_every_completed_fetch_is_persisted_once() {
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with_script("https://a.example", Duration::from_millis(300), false)
            .with_script("https://b.example", Duration::from_millis(1_700), true)
            .with_script("https://c.example", Duration::from_secs(4), false),
    );
    let targets = vec![
        create_target("https://a.example", Duration::from_secs(1), None),
        create_target("https://b.example", Duration::from_secs(2), None),
        create_target("https://c.example", Duration::from_secs(3), None),
    ];
    let backend = Arc::new(MemoryBackend::new());
    let pipeline = Pipeline::new(
        targets,
        Arc::clone(&fetcher) as Arc<dyn Fetcher>,
        Arc::clone(&backend) as Arc<dyn StorageBackend>,
        settings(Duration::from_millis(2_500), FlushFailurePolicy::Halt),
    );

    pipeline
        .run_until(tokio::time::sleep(Duration::from_millis(20_050)))
        .await
        .unwrap();

    let persisted = backend.results().len() + backend.errors().len();
    assert!(persisted > 0);
    assert_eq!(persisted, fetcher.completed());
    assert!(
        backend
            .errors()
            .iter()
            .all(|failure| failure.url == "https://b.example")
    );
}
