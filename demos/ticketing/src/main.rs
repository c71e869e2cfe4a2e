//! Ticketing HTTP server.
//!
//! Sells one item with a fixed stock over `POST /buy_ticket`, backed by
//! `PostgreSQL`, with Prometheus metrics on a separate port.

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tally_core::ResourceStore;
use tally_postgres::PostgresResourceStore;
use tally_runtime::{TransactionEngine, metrics::MetricsServer};
use ticketing::{TicketingState, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ticketing=info,tally_runtime=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ticketing server");

    let config = Config::from_env();
    let policy = config.engine.retry_policy();
    info!(
        bind = %config.bind_addr(),
        item_id = config.ticket.item_id,
        stock = config.ticket.stock,
        reset_on_start = config.ticket.reset_on_start,
        max_backoff_ms = u64::try_from(policy.total_backoff().as_millis()).unwrap_or(u64::MAX),
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(config.server.metrics_addr);
    metrics.start()?;

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .connect(&config.postgres.url)
        .await?;
    let store = Arc::new(
        PostgresResourceStore::from_pool(pool).with_lock_timeout(config.engine.lock_timeout()),
    );
    store.migrate().await?;

    let written = store
        .seed(vec![config.ticket.seed_record()], config.ticket.seed_mode())
        .await?;
    info!(written, mode = ?config.ticket.seed_mode(), "Stock seeded");

    let engine = TransactionEngine::new(store.clone())
        .with_retry_policy(policy)
        .with_upstream(Arc::new(config.engine.upstream()));
    let app = ticketing::app(TicketingState::new(engine, config.ticket.resource_id()));

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
