mod memory;
mod null;
mod redis_cache;

pub use memory::InMemoryCache;
pub use null::NullCache;
pub use redis_cache::RedisCache;

use async_trait::async_trait;
use std::time::Duration;

/// Key-value cache with TTL, pluggable per deployment.
///
/// Every method "may suspend on I/O" but never surfaces an error to the
/// caller: a backend failure is logged and collapses to a miss (`get`,
/// `exists`) or a silent no-op (`set`, `delete`). The service must be free
/// to treat any cache outcome as advisory.
#[async_trait]
pub trait CacheStrategy: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str, ttl: Duration);
    async fn delete(&self, key: &str);
    async fn exists(&self, key: &str) -> bool;
    /// Test/admin only — not used on any hot path.
    async fn clear(&self);
}

pub fn url_cache_key(short_code: &str) -> String {
    format!("url:{short_code}")
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub url: Option<String>,
    pub ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Remote,
    Memory,
    Null,
}
