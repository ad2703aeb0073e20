mod clickhouse;
mod sqlite_store;

pub use clickhouse::ClickHouseHitStorage;
pub use sqlite_store::SqliteHitStorage;

use crate::error::CoreResult;
use crate::models::HitEvent;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Append-only analytics events plus aggregation queries.
#[async_trait]
pub trait HitStorageStrategy: Send + Sync {
    /// Bulk append; atomic per call in the durable variant.
    async fn store_hits(&self, events: &[HitEvent]) -> CoreResult<()>;

    async fn total_hits(&self, code: &str) -> CoreResult<i64>;
    async fn hits_by_device(&self, code: &str) -> CoreResult<BTreeMap<String, i64>>;
    async fn hits_by_browser(&self, code: &str) -> CoreResult<BTreeMap<String, i64>>;
    async fn hits_by_country(&self, code: &str) -> CoreResult<BTreeMap<String, i64>>;

    /// Ordered by count descending, ties broken lexicographically by referer.
    async fn top_referers(&self, code: &str, limit: usize) -> CoreResult<Vec<(String, i64)>>;

    /// Ascending date order, covering the most recent `days` UTC days.
    async fn hits_over_time(&self, code: &str, days: u32) -> CoreResult<Vec<(NaiveDate, i64)>>;

    /// Flush any buffered events. No-op for unbuffered variants.
    async fn flush(&self) -> CoreResult<()>;
}

#[derive(Debug, Clone)]
pub struct HitStorageConfig {
    pub backend: HitStorageBackend,
    pub path_or_url: String,
    pub buffer_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitStorageBackend {
    RowStore,
    ColumnStore,
}
