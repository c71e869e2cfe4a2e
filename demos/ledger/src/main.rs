//! Ledger HTTP server.
//!
//! Serves `POST /transaction`, `GET /resources/:id` and health probes over a
//! `PostgreSQL` balance table, with Prometheus metrics on a separate port.

use ledger::config::Config;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tally_core::{ResourceStore, SeedMode};
use tally_postgres::PostgresResourceStore;
use tally_runtime::{TransactionEngine, metrics::MetricsServer};
use tally_web::{AppState, Profile, router};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledger=info,tally_runtime=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ledger server");

    let config = Config::from_env();
    let policy = config.engine.retry_policy();
    info!(
        bind = %config.bind_addr(),
        metrics = %config.server.metrics_addr,
        max_attempts = config.engine.retry_max_attempts,
        upstream_latency_ms = config.engine.upstream_latency_ms,
        max_backoff_ms = u64::try_from(policy.total_backoff().as_millis()).unwrap_or(u64::MAX),
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(config.server.metrics_addr);
    metrics.start()?;

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout))
        .connect(&config.database.url)
        .await?;
    let store = Arc::new(
        PostgresResourceStore::from_pool(pool).with_lock_timeout(config.engine.lock_timeout()),
    );
    store.migrate().await?;
    let seeded = store
        .seed(ledger::seed_accounts(), SeedMode::InsertMissing)
        .await?;
    info!(seeded, "Database ready");

    let engine = TransactionEngine::new(store.clone())
        .with_retry_policy(policy)
        .with_upstream(Arc::new(config.engine.upstream()));
    let app = router(AppState::new(engine, Profile::Ledger));

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!(addr = %listener.local_addr()?, "Server listening");

    tally_web::server::serve(
        listener,
        app,
        Duration::from_secs(config.server.shutdown_timeout),
    )
    .await?;

    store.close().await;
    info!("Server shut down");
    Ok(())
}
