mod metrics;

use axum::{routing::get, Router};
use prometheus::Registry;
use shortener_core::queue::{InMemoryQueue, QueueBackend, QueueStrategy, RedisStreamQueue};
use shortener_core::storage::{ClickHouseHitStorage, HitStorageBackend, HitStorageStrategy, SqliteHitStorage};
use shortener_core::store::{PostgresUrlStore, SqliteUrlStore, UrlStore};
use shortener_core::{Config, HitWorker, HitWorkerConfig};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::from_env()?;
    tracing::info!(app = %config.app_name, "starting shortener-worker");

    let registry = Arc::new(Registry::new());
    {
        let registry = Arc::clone(&registry);
        let metrics_port = std::env::var("WORKER_METRICS_PORT").unwrap_or_else(|_| "9200".to_string());
        tokio::spawn(async move {
            let app = Router::new().route(
                "/metrics",
                get(move || {
                    let r = Arc::clone(&registry);
                    async move { metrics::gather(&r) }
                }),
            );
            let addr = format!("0.0.0.0:{metrics_port}");
            match tokio::net::TcpListener::bind(&addr).await {
                Ok(listener) => {
                    tracing::info!(addr, "metrics server listening");
                    if let Err(e) = axum::serve(listener, app).await {
                        tracing::error!(error = %e, "metrics server exited");
                    }
                }
                Err(e) => tracing::error!(error = %e, addr, "failed to bind metrics server"),
            }
        });
    }

    let store: Arc<dyn UrlStore> = if config.database_url.starts_with("sqlite") {
        Arc::new(SqliteUrlStore::connect(&config.database_url).await?)
    } else {
        Arc::new(PostgresUrlStore::connect(&config.database_url).await?)
    };

    let queue: Arc<dyn QueueStrategy> = match config.queue_backend {
        QueueBackend::Streams => Arc::new(
            RedisStreamQueue::connect(&config.redis_url, &config.queue_consumer_group, "shortener-worker")
                .await?,
        ),
        QueueBackend::Memory => Arc::new(InMemoryQueue::new()),
    };

    let storage: Arc<dyn HitStorageStrategy> = match config.hit_storage_backend {
        HitStorageBackend::RowStore => {
            Arc::new(SqliteHitStorage::connect(&config.hit_storage_sqlite_path).await?)
        }
        HitStorageBackend::ColumnStore => Arc::new(
            ClickHouseHitStorage::connect(
                &config.hit_storage_clickhouse_url,
                &config.hit_storage_clickhouse_database,
                config.hit_storage_buffer_size,
                config.hit_storage_flush_interval,
                None,
            )
            .await?,
        ),
    };

    let worker = HitWorker::new(
        queue,
        storage,
        store,
        HitWorkerConfig {
            stream_name: config.queue_name.clone(),
            batch_size: config.queue_batch_size,
            block_time: config.queue_worker_interval,
            flush_interval: config.hit_storage_flush_interval,
            shutdown_deadline: config.worker_shutdown_deadline,
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        tracing::info!("shutdown signal received, draining queue");
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await?;
    tracing::info!("worker exited cleanly");
    Ok(())
}
