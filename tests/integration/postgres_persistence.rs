//! PostgreSQL persistence tests
//!
//! These need a reachable server, configured through the same variables the
//! monitor reads (`DB_HOST`, `DB_PORT`, `POSTGRES_USER`, `POSTGRES_PASSWORD`,
//! `DB_NAME`). Run them with `cargo test -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use web_monitoring::actors::FlushFailurePolicy;
use web_monitoring::fetcher::Fetcher;
use web_monitoring::pipeline::{Pipeline, PipelineSettings};
use web_monitoring::storage::postgres::{PgConnection, PostgresBackend};
use web_monitoring::storage::{Batch, StorageBackend, TableNames};
use web_monitoring::util;

use crate::helpers::*;

fn connection() -> PgConnection {
    PgConnection {
        host: util::get_db_host(),
        port: util::get_db_port(),
        user: util::get_db_user(),
        password: util::get_db_password(),
        database: util::get_db_name(),
    }
}

/// Table names private to one test run
fn tables(prefix: &str) -> TableNames {
    let id = std::process::id();
    TableNames::new(
        format!("{prefix}_results_{id}"),
        format!("{prefix}_errors_{id}"),
    )
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server"]
async fn test_insert_and_read_back() {
    let backend = PostgresBackend::new(&connection(), tables("rw"))
        .await
        .unwrap();
    let url = "https://a.example";

    let first = create_outcome(url, 200);
    let mut second = create_outcome(url, 503);
    second.pattern_matched = Some(false);

    backend
        .insert(Batch::Results(vec![first.clone(), second]))
        .await
        .unwrap();
    backend
        .insert(Batch::Errors(vec![create_failure(url)]))
        .await
        .unwrap();

    let results = backend.latest_results(url, 10).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].id < results[1].id);
    assert_eq!(results[0].status_code, 200);
    assert_eq!(results[0].pattern_matched, None);
    assert_eq!(results[1].status_code, 503);
    assert_eq!(results[1].pattern_matched, Some(false));
    assert!((results[0].duration - 0.02).abs() < 1e-9);

    // TIMESTAMPTZ keeps microseconds
    let drift = (results[0].timestamp - first.timestamp).num_microseconds().unwrap();
    assert!(drift.abs() <= 1);

    let latest = backend.latest_results(url, 1).await.unwrap();
    assert_eq!(latest[0].status_code, 503);

    let errors = backend.latest_errors(url, 10).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error, "connect: connection refused");

    assert!(backend.health_check().await.unwrap().healthy);

    backend.drop_tables().await.unwrap();
    assert!(backend.latest_results(url, 10).await.is_err());
    backend.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL server"]
async fn test_pipeline_writes_to_postgres() {
    let ok = "https://ok.example";
    let down = "https://down.example";
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with_script(ok, Duration::from_millis(10), false)
            .with_script(down, Duration::from_millis(10), true),
    );
    let backend = Arc::new(
        PostgresBackend::new(&connection(), tables("pipeline"))
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
    assert_eq!(results.len() + errors.len(), fetcher.completed());

    backend.drop_tables().await.unwrap();
    backend.close().await.unwrap();
}
