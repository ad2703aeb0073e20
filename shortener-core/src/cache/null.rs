use super::CacheStrategy;
use async_trait::async_trait;
use std::time::Duration;

/// Null Object cache — all operations succeed, returning miss/false.
/// Used to disable caching entirely without branching in the service layer.
#[derive(Default)]
pub struct NullCache;

impl NullCache {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheStrategy for NullCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) {}

    async fn delete(&self, _key: &str) {}

    async fn exists(&self, _key: &str) -> bool {
        false
    }

    async fn clear(&self) {}
}
