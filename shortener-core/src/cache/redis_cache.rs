use super::CacheStrategy;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::Mutex;

/// Networked key-value cache shared across all server and worker processes.
///
/// Wraps a single `ConnectionManager` behind a mutex: one shared connection
/// per role rather than a pool — `ConnectionManager` already multiplexes
/// and auto-reconnects underneath.
pub struct RedisCache {
    conn: Mutex<ConnectionManager>,
}

impl RedisCache {
    pub async fn connect(url: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl CacheStrategy for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn.lock().await;
        match conn.get::<_, Option<String>>(key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, key, "cache get failed, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let mut conn = self.conn.lock().await;
        let ttl_secs = ttl.as_secs().max(1);
        if let Err(e) = conn
            .set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
        {
            tracing::warn!(error = %e, key, "cache set failed");
        }
    }

    async fn delete(&self, key: &str) {
        let mut conn = self.conn.lock().await;
        if let Err(e) = conn.del::<_, ()>(key).await {
            tracing::warn!(error = %e, key, "cache delete failed");
        }
    }

    async fn exists(&self, key: &str) -> bool {
        let mut conn = self.conn.lock().await;
        match conn.exists::<_, bool>(key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, key, "cache exists check failed, treating as absent");
                false
            }
        }
    }

    async fn clear(&self) {
        let mut conn = self.conn.lock().await;
        if let Err(e) = redis::cmd("FLUSHDB")
            .query_async::<_, ()>(&mut *conn)
            .await
        {
            tracing::warn!(error = %e, "cache clear failed");
        }
    }
}
