use super::CacheStrategy;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process map cache. TTL is best-effort: expiry is checked lazily on
/// access, not swept proactively, so a stale entry can briefly outlive its
/// TTL under light traffic. Not shared across processes.
#[derive(Default)]
pub struct InMemoryCache {
    map: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStrategy for InMemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let map = self.map.read().await;
        match map.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            _ => None,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let mut map = self.map.write().await;
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn delete(&self, key: &str) {
        let mut map = self.map.write().await;
        map.remove(key);
    }

    async fn exists(&self, key: &str) -> bool {
        let map = self.map.read().await;
        matches!(map.get(key), Some(entry) if entry.expires_at > Instant::now())
    }

    async fn clear(&self) {
        let mut map = self.map.write().await;
        map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, Some("v".to_string()));
        assert!(cache.exists("k").await);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", Duration::from_secs(60)).await;
        cache.delete("k").await;
        cache.delete("k").await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn expired_entries_miss() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", Duration::from_millis(1)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await, None);
    }
}
