//! Order ingestion service.
//!
//! Consumes order events from Redpanda into Postgres and serves `GET /orders`.

use anyhow::Context;
use order_ingest_core::{MessageFeed, OrderStore};
use order_ingest_postgres::PostgresOrderStore;
use order_ingest_redpanda::RedpandaMessageFeed;
use order_ingest_service::{
    AppState, Application, Config, OrderConsumer, OrderMessageHandler, build_router, metrics,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,order_ingest=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting order ingestion service");

    let config = Config::from_env();
    info!(
        database_url = %config.redacted_database_url(),
        redpanda_brokers = %config.redpanda.brokers,
        orders_topic = %config.redpanda.orders_topic,
        consumer_group = %config.redpanda.consumer_group,
        "Configuration loaded"
    );

    if let Some(address) = config.server.metrics_addr {
        metrics::install_exporter(address).context("failed to install Prometheus exporter")?;
    }

    info!("Connecting to database...");
    let pool_options = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout));
    let postgres = PostgresOrderStore::connect_with(pool_options, &config.postgres.url)
        .await
        .context("failed to connect to database")?;

    if config.postgres.run_migrations {
        postgres.migrate().await.context("failed to run migrations")?;
        info!("Database migrations applied");
    }
    let store: Arc<dyn OrderStore> = Arc::new(postgres.clone());

    info!("Connecting to Redpanda...");
    let feed: Arc<dyn MessageFeed> = Arc::new(
        RedpandaMessageFeed::builder()
            .brokers(&config.redpanda.brokers)
            .consumer_group(&config.redpanda.consumer_group)
            .auto_offset_reset(&config.redpanda.auto_offset_reset)
            .redelivery_backoff(config.redelivery_backoff())
            .max_redelivery_backoff(config.max_redelivery_backoff())
            .build()
            .context("invalid Redpanda configuration")?,
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let consumer = OrderConsumer::builder()
        .name("orders")
        .subscription(&config.redpanda.orders_topic)
        .feed(feed)
        .handler(Arc::new(OrderMessageHandler::new(Arc::clone(&store))))
        .shutdown(shutdown_rx)
        .retry_delay(Duration::from_secs(config.ingest.retry_delay))
        .max_in_flight(config.ingest.max_in_flight)
        .build()?;

    let router = build_router(AppState::new(store));
    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;

    Application::new(listener, router, consumer, shutdown_tx, config.shutdown_timeout())
        .with_postgres(postgres)
        .run()
        .await?;

    Ok(())
}
