//! SQLite persistence through the full pipeline
//!
//! These tests verify that:
//! - Flushed batches land in the configured tables
//! - Data survives reopening the database file
//! - Custom table names are honoured
//! - Dropping the tables leaves the database empty

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use web_monitoring::actors::FlushFailurePolicy;
use web_monitoring::fetcher::Fetcher;
use web_monitoring::pipeline::{Pipeline, PipelineSettings};
use web_monitoring::storage::sqlite::SqliteBackend;
use web_monitoring::storage::{Batch, StorageBackend, TableNames};

use crate::helpers::*;

#[tokio::test]
async fn test_pipeline_writes_to_sqlite() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("monitoring.db");

    let ok = "https://ok.example";
    let down = "https://down.example";
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with_script(ok, Duration::from_millis(10), false)
            .with_script(down, Duration::from_millis(10), true),
    );

    let backend = Arc::new(
        SqliteBackend::new(&db_path, TableNames::default())
            .await
            .unwrap(),
    );
    let pipeline = Pipeline::new(
        vec![
            create_target(ok, Duration::from_millis(200), None),
            create_target(down, Duration::from_millis(200), None),
        ],
        Arc::clone(&fetcher) as Arc<dyn Fetcher>,
        Arc::clone(&backend) as Arc<dyn StorageBackend>,
        PipelineSettings {
            result_flush_period: Duration::from_millis(250),
            error_flush_period: Duration::from_millis(400),
            failure_policy: FlushFailurePolicy::Halt,
        },
    );

    pipeline
        .run_until(tokio::time::sleep(Duration::from_secs(1)))
        .await
        .unwrap();

    let results = backend.latest_results(ok, 100).await.unwrap();
    let errors = backend.latest_errors(down, 100).await.unwrap();
    assert!(!results.is_empty());
    assert!(!errors.is_empty());
    assert_eq!(results.len() + errors.len(), fetcher.completed());

    // Rows come back oldest first with increasing ids
    assert!(results.windows(2).all(|pair| pair[0].id < pair[1].id));
    assert!(results.iter().all(|row| row.status_code == 200));
    assert!(results.iter().all(|row| row.pattern_matched.is_none()));
    assert!(
        errors
            .iter()
            .all(|row| row.error == "timeout: scripted failure")
    );

    backend.close().await.unwrap();
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("monitoring.db");
    let url = "https://a.example";

    {
        let backend = SqliteBackend::new(&db_path, TableNames::default())
            .await
            .unwrap();
        backend
            .insert(Batch::Results(vec![
                create_outcome(url, 200),
                create_outcome(url, 503),
            ]))
            .await
            .unwrap();
        backend
            .insert(Batch::Errors(vec![create_failure(url)]))
            .await
            .unwrap();
        backend.close().await.unwrap();
    }

    let backend = SqliteBackend::new(&db_path, TableNames::default())
        .await
        .unwrap();

    let status_codes: Vec<u16> = backend
        .latest_results(url, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.status_code)
        .collect();
    assert_eq!(status_codes, vec![200, 503]);

    let errors = backend.latest_errors(url, 10).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error, "connect: connection refused");

    backend.close().await.unwrap();
}

#[tokio::test]
async fn test_custom_table_names_and_drop() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("monitoring.db");
    let url = "https://a.example";

    let custom = SqliteBackend::new(&db_path, TableNames::new("probe_ok", "probe_failed"))
        .await
        .unwrap();
    custom
        .insert(Batch::Results(vec![create_outcome(url, 200)]))
        .await
        .unwrap();

    // Default tables in the same file are untouched
    let default = SqliteBackend::new(&db_path, TableNames::default())
        .await
        .unwrap();
    assert!(default.latest_results(url, 10).await.unwrap().is_empty());
    assert_eq!(custom.latest_results(url, 10).await.unwrap().len(), 1);

    custom.drop_tables().await.unwrap();
    assert!(custom.latest_results(url, 10).await.is_err());
    assert!(default.health_check().await.unwrap().healthy);

    custom.close().await.unwrap();
    default.close().await.unwrap();
}
