use crate::metrics::AppMetrics;
use prometheus::Registry;
use shortener_core::cache::{CacheBackend, CacheStrategy, InMemoryCache, NullCache, RedisCache};
use shortener_core::config::Config;
use shortener_core::queue::{InMemoryQueue, QueueBackend, QueueStrategy, RedisStreamQueue};
use shortener_core::shortcode::build_strategy;
use shortener_core::store::{PostgresUrlStore, SqliteUrlStore, UrlStore};
use shortener_core::UrlService;
use std::sync::Arc;

/// Shared application state injected into every handler via axum's `State` extractor.
pub struct AppState {
    pub config: Config,
    pub service: UrlService,
    pub metrics: &'static AppMetrics,
    pub registry: Registry,
}

impl AppState {
    pub async fn build(config: Config) -> anyhow::Result<Arc<Self>> {
        let store: Arc<dyn UrlStore> = if config.database_url.starts_with("sqlite") {
            Arc::new(SqliteUrlStore::connect(&config.database_url).await?)
        } else {
            Arc::new(PostgresUrlStore::connect(&config.database_url).await?)
        };

        let cache: Arc<dyn CacheStrategy> = match config.cache_backend {
            CacheBackend::Remote => Arc::new(RedisCache::connect(&config.redis_url).await?),
            CacheBackend::Memory => Arc::new(InMemoryCache::new()),
            CacheBackend::Null => Arc::new(NullCache::new()),
        };

        let queue: Arc<dyn QueueStrategy> = match config.queue_backend {
            QueueBackend::Streams => Arc::new(
                RedisStreamQueue::connect(&config.redis_url, &config.queue_consumer_group, "shortener-server")
                    .await?,
            ),
            QueueBackend::Memory => Arc::new(InMemoryQueue::new()),
        };

        let short_code = build_strategy(&shortener_core::shortcode::ShortCodeConfig {
            strategy: config.short_code_strategy,
            length: config.short_code_length,
            salt: config.short_code_salt,
            max_retries: config.short_code_max_retries,
        });

        let service = UrlService::new(
            store,
            cache,
            queue,
            short_code,
            config.cache_ttl,
            config.queue_name.clone(),
        );

        let registry = Registry::new();
        let metrics = crate::metrics::init(&registry);

        Ok(Arc::new(Self {
            config,
            service,
            metrics,
            registry,
        }))
    }
}
