use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use web_monitoring::{
    config::{ResolvedConfig, StorageConfig, read_config_file},
    fetcher::HttpFetcher,
    pipeline::Pipeline,
    storage::{MemoryBackend, StorageBackend, TableNames},
};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Log everything down to TRACE
    #[arg(short, long)]
    verbose: bool,
}

fn init(verbose: bool) {
    dotenv::dotenv().ok();

    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("web_monitoring", level),
        ("web_monitor", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

async fn open_backend(
    storage: &StorageConfig,
    tables: TableNames,
) -> anyhow::Result<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match storage {
        StorageConfig::None => {
            warn!("no storage configured, probe records are kept in memory only");
            Arc::new(MemoryBackend::new())
        }

        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => Arc::new(
            web_monitoring::storage::sqlite::SqliteBackend::new(path, tables).await?,
        ),

        #[cfg(feature = "storage-postgres")]
        StorageConfig::Postgres {
            host,
            port,
            user,
            password,
            database,
        } => {
            use web_monitoring::storage::postgres::{PgConnection, PostgresBackend};

            let connection = PgConnection {
                host: host.clone(),
                port: *port,
                user: user.clone(),
                password: password.clone(),
                database: database.clone(),
            };
            Arc::new(PostgresBackend::new(&connection, tables).await?)
        }

        #[allow(unreachable_patterns)]
        other => anyhow::bail!("storage backend {other:?} is not compiled in"),
    };

    let health = backend.health_check().await?;
    if !health.healthy {
        anyhow::bail!("storage backend unhealthy: {}", health.message);
    }
    info!("{}", health.message);

    Ok(backend)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)
        .with_context(|| format!("failed to load config from {}", args.file))?;
    let ResolvedConfig {
        targets,
        timeout,
        settings,
        storage,
        tables,
    } = config.resolve()?;

    let backend = open_backend(&storage, tables).await?;
    let fetcher = Arc::new(HttpFetcher::new()?);
    info!(
        "monitoring {} targets (default timeout {:?})",
        targets.len(),
        timeout
    );

    let pipeline = Pipeline::new(targets, fetcher, Arc::clone(&backend), settings);
    let result = pipeline
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await;

    if let Err(e) = backend.close().await {
        warn!("error closing backend: {e}");
    }

    result?;
    info!("monitor stopped");
    Ok(())
}
