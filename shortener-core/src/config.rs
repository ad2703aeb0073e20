use crate::cache::CacheBackend;
use crate::queue::QueueBackend;
use crate::shortcode::ShortCodeKind;
use crate::storage::HitStorageBackend;
use std::time::Duration;

/// All configuration loaded from environment variables, with the same
/// loading priority as the original settings module: env vars, then
/// `.env`, then the defaults below.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub app_env: String,
    pub base_url: String,

    pub database_url: String,

    pub short_code_strategy: ShortCodeKind,
    pub short_code_length: usize,
    pub short_code_salt: i64,
    pub short_code_max_retries: u32,

    pub cache_backend: CacheBackend,
    pub redis_url: String,
    pub cache_ttl: Duration,

    pub queue_backend: QueueBackend,
    pub queue_name: String,
    pub queue_consumer_group: String,
    pub queue_batch_size: usize,
    pub queue_worker_interval: Duration,

    pub hit_storage_backend: HitStorageBackend,
    pub hit_storage_sqlite_path: String,
    pub hit_storage_clickhouse_url: String,
    pub hit_storage_clickhouse_database: String,
    pub hit_storage_buffer_size: usize,
    pub hit_storage_flush_interval: Duration,

    pub worker_shutdown_deadline: Duration,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T
where
    T::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_parse(key, default_secs))
}

fn parse_short_code_strategy(raw: &str) -> ShortCodeKind {
    match raw {
        "random" => ShortCodeKind::Random,
        _ => ShortCodeKind::Base62,
    }
}

fn parse_cache_backend(raw: &str) -> CacheBackend {
    match raw {
        "memory" => CacheBackend::Memory,
        "null" => CacheBackend::Null,
        _ => CacheBackend::Remote,
    }
}

fn parse_queue_backend(raw: &str) -> QueueBackend {
    match raw {
        "memory" => QueueBackend::Memory,
        _ => QueueBackend::Streams,
    }
}

fn parse_hit_storage_backend(raw: &str) -> HitStorageBackend {
    match raw {
        "clickhouse" => HitStorageBackend::ColumnStore,
        _ => HitStorageBackend::RowStore,
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            app_name: env_or("APP_NAME", "url-shortener"),
            app_env: env_or("APP_ENV", "development"),
            base_url: env_or("BASE_URL", "http://127.0.0.1:8000"),

            database_url: env_or("DATABASE_URL", "sqlite://url_shortener.db"),

            short_code_strategy: parse_short_code_strategy(&env_or("SHORT_CODE_STRATEGY", "base62")),
            short_code_length: env_parse("SHORT_URL_LENGTH", 5),
            short_code_salt: env_parse("SHORT_CODE_SALT", 1256),
            short_code_max_retries: env_parse("MAX_RETRIES", 5),

            cache_backend: parse_cache_backend(&env_or("CACHE_BACKEND", "redis")),
            redis_url: env_or("REDIS_URL", "redis://localhost:6379/0"),
            cache_ttl: env_duration_secs("CACHE_TTL", 3600),

            queue_backend: parse_queue_backend(&env_or("QUEUE_BACKEND", "redis_streams")),
            queue_name: env_or("QUEUE_NAME", "url_hits"),
            queue_consumer_group: env_or("QUEUE_CONSUMER_GROUP", "url_workers"),
            queue_batch_size: env_parse("QUEUE_BATCH_SIZE", 100),
            queue_worker_interval: env_duration_secs("QUEUE_WORKER_INTERVAL", 1),

            hit_storage_backend: parse_hit_storage_backend(&env_or("HIT_STORAGE_BACKEND", "sqlite")),
            hit_storage_sqlite_path: env_or("HIT_STORAGE_SQLITE_PATH", "sqlite://analytics.db"),
            hit_storage_clickhouse_url: env_or(
                "HIT_STORAGE_CLICKHOUSE_URL",
                "http://localhost:8123",
            ),
            hit_storage_clickhouse_database: env_or("HIT_STORAGE_CLICKHOUSE_DATABASE", "default"),
            hit_storage_buffer_size: env_parse("HIT_STORAGE_BUFFER_SIZE", 1000),
            hit_storage_flush_interval: env_duration_secs("HIT_STORAGE_FLUSH_INTERVAL_SECONDS", 30),

            worker_shutdown_deadline: env_duration_secs("WORKER_SHUTDOWN_DEADLINE_SECONDS", 10),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_backend_strings_fall_back_to_the_documented_default() {
        assert_eq!(parse_cache_backend("bogus"), CacheBackend::Remote);
        assert_eq!(parse_queue_backend("bogus"), QueueBackend::Streams);
        assert_eq!(parse_hit_storage_backend("bogus"), HitStorageBackend::RowStore);
        assert_eq!(parse_short_code_strategy("bogus"), ShortCodeKind::Base62);
    }
}
