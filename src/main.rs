use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod cache;
mod config;
mod consumer;
mod messaging;
mod metrics;
mod models;
mod service;
mod store;
mod utils;

use cache::BoundedCache;
use config::Config;
use consumer::IngestConsumer;
use messaging::{ensure_topic, KafkaPublisher, KafkaSource};
use service::OrderService;
use store::{OrderStore, PostgresOrderStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging with environment-based filtering.
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_ingest=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order ingestion service");

    let cfg = Config::from_env()?;

    // === 1. Durable store ===
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url())
        .await?;
    let postgres_store = PostgresOrderStore::new(pool);
    postgres_store.init_schema().await?;
    tracing::info!(host = %cfg.db_host, db = %cfg.db_name, "connected to Postgres");

    // === 2. Stream topic ===
    ensure_topic(&cfg.kafka_brokers, &cfg.kafka_topic, cfg.topic_partitions).await?;

    // === 3. Shared pipeline state ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    let cache = Arc::new(BoundedCache::new(cfg.cache_capacity)?);
    let store: Arc<dyn OrderStore> = Arc::new(postgres_store);
    let publisher = Arc::new(KafkaPublisher::new(&cfg.kafka_brokers, &cfg.kafka_topic)?);

    let service = OrderService::new(
        store.clone(),
        cache.clone(),
        publisher,
        metrics.clone(),
    );
    service.warm_cache().await;

    // === 4. Consumer task ===
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let source = KafkaSource::new(&cfg.kafka_brokers, &cfg.kafka_group_id, &cfg.kafka_topic)?;
    let ingest = IngestConsumer::new(source, store, cache, metrics.clone(), shutdown_rx);
    let consumer_handle = tokio::spawn(ingest.run());

    // === 5. HTTP API (blocks until SIGINT/SIGTERM) ===
    tracing::info!(addr = %cfg.http_addr, "serving HTTP API");
    let registry = Arc::new(metrics.registry().clone());
    api::run_http_server(service, registry, &cfg.http_addr).await?;

    // === 6. Graceful shutdown: stop the consumer and wait for it ===
    tracing::info!("🛑 HTTP server stopped, shutting down consumer");
    let _ = shutdown_tx.send(true);
    consumer_handle.await?;

    tracing::info!("shutdown complete");
    Ok(())
}
