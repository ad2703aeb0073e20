use crate::cache::{url_cache_key, CacheStrategy};
use crate::error::{CoreError, CoreResult};
use crate::models::{HitEvent, RequestMetadata, UrlRecord};
use crate::queue::QueueStrategy;
use crate::shortcode::{ShortCodeStrategy, UniquenessCheck};
use crate::store::UrlStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url as ParsedUrl;

/// Adapts `UrlStore::code_exists` to the `UniquenessCheck` capability C1's
/// random strategy needs.
struct StoreUniquenessCheck<'a> {
    store: &'a dyn UrlStore,
}

#[async_trait]
impl UniquenessCheck for StoreUniquenessCheck<'_> {
    async fn code_exists(&self, code: &str) -> CoreResult<bool> {
        self.store.code_exists(code).await
    }
}

/// Statistics view returned by `UrlService::stats`.
#[derive(Debug, Clone)]
pub struct UrlStats {
    pub short_code: String,
    pub total_hits: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Orchestrates C1–C5 on the hot path: create, resolve, publish_hit, stats, delete.
///
/// Generic over the four strategy traits plus the store so the concrete
/// backend mix is chosen once at startup and monomorphized — no dynamic
/// dispatch on the request path beyond what the trait objects already use
/// internally for pluggable backends.
pub struct UrlService {
    store: Arc<dyn UrlStore>,
    cache: Arc<dyn CacheStrategy>,
    queue: Arc<dyn QueueStrategy>,
    short_code: Arc<dyn ShortCodeStrategy>,
    cache_ttl: Duration,
    hit_stream: String,
}

impl UrlService {
    pub fn new(
        store: Arc<dyn UrlStore>,
        cache: Arc<dyn CacheStrategy>,
        queue: Arc<dyn QueueStrategy>,
        short_code: Arc<dyn ShortCodeStrategy>,
        cache_ttl: Duration,
        hit_stream: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cache,
            queue,
            short_code,
            cache_ttl,
            hit_stream: hit_stream.into(),
        }
    }

    /// Validate, insert a placeholder, derive a code, and commit it.
    ///
    /// Two concurrent creates of the same `long_url` are permitted and
    /// produce two different codes by construction — each call mints a
    /// fresh placeholder id, so the id-derived (or randomly drawn) code
    /// necessarily differs.
    pub async fn create(&self, long_url: &str) -> CoreResult<UrlRecord> {
        ParsedUrl::parse(long_url)
            .map_err(|_| CoreError::InvalidInput(format!("not an absolute URL: {long_url}")))?;

        let placeholder = self.store.create_placeholder(long_url).await?;

        let ctx = StoreUniquenessCheck {
            store: self.store.as_ref(),
        };
        let code = self.short_code.generate(placeholder.id, &ctx).await?;

        let record = self.store.set_short_code(placeholder.id, &code).await?;

        self.cache
            .set(&url_cache_key(&code), &record.long_url, self.cache_ttl)
            .await;

        Ok(record)
    }

    /// Cache-aside lookup. Never mutates `total_hits` — hit accounting is
    /// the caller's responsibility via `publish_hit`.
    pub async fn resolve(&self, code: &str) -> CoreResult<Option<String>> {
        let key = url_cache_key(code);
        if let Some(long_url) = self.cache.get(&key).await {
            return Ok(Some(long_url));
        }

        let record = match self.store.find_active_by_code(code).await? {
            Some(r) => r,
            None => return Ok(None),
        };

        self.cache.set(&key, &record.long_url, self.cache_ttl).await;
        Ok(Some(record.long_url))
    }

    /// Builds a hit event and publishes it; failures are logged and
    /// swallowed so the redirect itself always succeeds.
    pub async fn publish_hit(&self, code: &str, metadata: RequestMetadata) {
        let mut event = HitEvent::new(code);
        event.ip_address = metadata.ip_address;
        event.user_agent = metadata.user_agent;
        event.referer = metadata.referer;
        event.country = metadata.country;
        event.device_type = metadata.device_type;
        event.browser = metadata.browser;

        if let Err(e) = self.queue.publish(&self.hit_stream, &event).await {
            tracing::warn!(error = %e, code, "hit event publish failed, dropping");
        }
    }

    /// Full record lookup for `GET /api/v1/urls/{code}`, filtered to
    /// `is_active` like the redirect path — a soft-deleted URL is not
    /// visible here either.
    pub async fn get(&self, code: &str) -> CoreResult<Option<UrlRecord>> {
        self.store.find_active_by_code(code).await
    }

    /// Stats lookup for `GET /api/v1/urls/{code}/stats`, unfiltered by
    /// `is_active` — stats remain queryable for a soft-deleted URL.
    pub async fn stats(&self, code: &str) -> CoreResult<Option<UrlStats>> {
        let record = self.store.find_by_code(code).await?;
        Ok(record.map(|r| UrlStats {
            short_code: r.short_code.unwrap_or_default(),
            total_hits: r.total_hits,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }))
    }

    /// Used by the HTTP health check. The cache strategies fail open by
    /// contract (a down cache degrades to a miss, not an error), so only
    /// the store is meaningfully checkable here.
    pub async fn store_is_reachable(&self) -> bool {
        self.store.code_exists("__health__").await.is_ok()
    }

    /// Soft-deletes then invalidates the cache — in that order. Invalidating
    /// before the commit would let a racing reader repopulate the cache
    /// with stale data after the delete appears to have happened.
    pub async fn delete(&self, code: &str) -> CoreResult<bool> {
        let deleted = self.store.soft_delete(code).await?;
        if deleted {
            self.cache.delete(&url_cache_key(code)).await;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::queue::InMemoryQueue;
    use crate::shortcode::Base62Strategy;
    use crate::store::SqliteUrlStore;

    async fn service() -> UrlService {
        let store = Arc::new(SqliteUrlStore::connect("sqlite::memory:").await.unwrap());
        let cache = Arc::new(InMemoryCache::new());
        let queue = Arc::new(InMemoryQueue::new());
        let short_code = Arc::new(Base62Strategy::new(1000, 8));
        UrlService::new(store, cache, queue, short_code, Duration::from_secs(3600), "hits")
    }

    #[tokio::test]
    async fn rejects_non_absolute_urls() {
        let svc = service().await;
        let err = svc.create("not-a-url").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn property_round_trip_create_then_resolve() {
        let svc = service().await;
        let record = svc.create("https://example.com/a").await.unwrap();
        let code = record.short_code.unwrap();
        let resolved = svc.resolve(&code).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("https://example.com/a"));
    }

    #[tokio::test]
    async fn concurrent_creates_of_same_url_yield_distinct_codes() {
        let svc = service().await;
        let a = svc.create("https://example.com/a").await.unwrap();
        let b = svc.create("https://example.com/a").await.unwrap();
        assert_ne!(a.short_code, b.short_code);
    }

    #[tokio::test]
    async fn resolve_of_unknown_code_is_absent() {
        let svc = service().await;
        assert_eq!(svc.resolve("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn property_soft_delete_isolation() {
        let svc = service().await;
        let record = svc.create("https://example.com/a").await.unwrap();
        let code = record.short_code.unwrap();
        assert!(svc.resolve(&code).await.unwrap().is_some());

        assert!(svc.delete(&code).await.unwrap());
        assert_eq!(svc.resolve(&code).await.unwrap(), None);
        assert!(!svc.cache.exists(&url_cache_key(&code)).await);
    }

    #[tokio::test]
    async fn get_hides_soft_deleted_record_but_stats_still_sees_it() {
        let svc = service().await;
        let record = svc.create("https://example.com/a").await.unwrap();
        let code = record.short_code.unwrap();

        assert!(svc.get(&code).await.unwrap().is_some());
        assert!(svc.delete(&code).await.unwrap());

        assert_eq!(svc.get(&code).await.unwrap(), None);
        assert!(svc.stats(&code).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_of_unknown_code_reports_false() {
        let svc = service().await;
        assert!(!svc.delete("nope").await.unwrap());
    }

    #[tokio::test]
    async fn property_cache_miss_recovery() {
        let svc = service().await;
        let record = svc.create("https://example.com/a").await.unwrap();
        let code = record.short_code.unwrap();

        // Flush cache, simulating a cold cache / different process.
        svc.cache.clear().await;
        assert_eq!(svc.cache.get(&url_cache_key(&code)).await, None);

        let resolved = svc.resolve(&code).await.unwrap();
        assert_eq!(resolved.as_deref(), Some("https://example.com/a"));

        // Second get now hits the cache without touching the store.
        assert_eq!(
            svc.cache.get(&url_cache_key(&code)).await,
            Some("https://example.com/a".to_string())
        );
    }

    #[tokio::test]
    async fn publish_hit_reaches_the_queue() {
        let svc = service().await;
        svc.publish_hit("abc12", RequestMetadata::default()).await;
        let batch = svc
            .queue
            .consume("hits", 10, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].event.short_code, "abc12");
    }
}
