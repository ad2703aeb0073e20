mod postgres_store;
mod sqlite_store;

pub use postgres_store::PostgresUrlStore;
pub use sqlite_store::SqliteUrlStore;

use crate::error::CoreResult;
use crate::models::UrlRecord;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Transactional source of truth for URL records. Used by both the hot
/// redirect path (C6) and the hit worker's counter flush (C7).
#[async_trait]
pub trait UrlStore: Send + Sync {
    /// Insert `{long_url, short_code=null}` and return the assigned id.
    async fn create_placeholder(&self, long_url: &str) -> CoreResult<UrlRecord>;

    /// Set the short code for a previously created placeholder.
    async fn set_short_code(&self, id: i64, code: &str) -> CoreResult<UrlRecord>;

    /// Lookup filtered to `is_active = true`, as used by the redirect path.
    async fn find_active_by_code(&self, code: &str) -> CoreResult<Option<UrlRecord>>;

    /// Lookup regardless of `is_active`, as used by stats/admin views.
    async fn find_by_code(&self, code: &str) -> CoreResult<Option<UrlRecord>>;

    async fn code_exists(&self, code: &str) -> CoreResult<bool>;

    /// Soft-delete: sets `is_active = false`. Returns false if the code was not found.
    async fn soft_delete(&self, code: &str) -> CoreResult<bool>;

    /// Apply all deltas within a single transaction.
    async fn batch_increment_hits(&self, deltas: &BTreeMap<String, i64>) -> CoreResult<()>;
}
