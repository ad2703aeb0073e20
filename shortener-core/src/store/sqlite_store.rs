use super::UrlStore;
use crate::error::{CoreError, CoreResult};
use crate::models::UrlRecord;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, Row, SqlitePool};
use std::collections::BTreeMap;

#[derive(FromRow)]
struct UrlRow {
    id: i64,
    long_url: String,
    short_code: Option<String>,
    total_hits: i64,
    is_active: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<UrlRow> for UrlRecord {
    fn from(r: UrlRow) -> Self {
        UrlRecord {
            id: r.id,
            long_url: r.long_url,
            short_code: r.short_code,
            total_hits: r.total_hits,
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// SQLite-backed authoritative store — development and test use, same
/// contract as the Postgres variant.
pub struct SqliteUrlStore {
    pool: SqlitePool,
}

impl SqliteUrlStore {
    pub async fn connect(path_or_url: &str) -> CoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(path_or_url)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> CoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS urls (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                long_url    TEXT NOT NULL,
                short_code  TEXT UNIQUE,
                total_hits  INTEGER NOT NULL DEFAULT 0,
                is_active   INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
                updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl UrlStore for SqliteUrlStore {
    async fn create_placeholder(&self, long_url: &str) -> CoreResult<UrlRecord> {
        let id: i64 = sqlx::query("INSERT INTO urls (long_url, short_code) VALUES (?, NULL)")
            .bind(long_url)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?
            .last_insert_rowid();

        let row: UrlRow = sqlx::query_as(
            "SELECT id, long_url, short_code, total_hits, is_active, created_at, updated_at FROM urls WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        Ok(row.into())
    }

    async fn set_short_code(&self, id: i64, code: &str) -> CoreResult<UrlRecord> {
        sqlx::query("UPDATE urls SET short_code = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE id = ?")
            .bind(code)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        let row: UrlRow = sqlx::query_as(
            "SELECT id, long_url, short_code, total_hits, is_active, created_at, updated_at FROM urls WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        Ok(row.into())
    }

    async fn find_active_by_code(&self, code: &str) -> CoreResult<Option<UrlRecord>> {
        let row: Option<UrlRow> = sqlx::query_as(
            "SELECT id, long_url, short_code, total_hits, is_active, created_at, updated_at \
             FROM urls WHERE short_code = ? AND is_active = 1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        Ok(row.map(Into::into))
    }

    async fn find_by_code(&self, code: &str) -> CoreResult<Option<UrlRecord>> {
        let row: Option<UrlRow> = sqlx::query_as(
            "SELECT id, long_url, short_code, total_hits, is_active, created_at, updated_at FROM urls WHERE short_code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        Ok(row.map(Into::into))
    }

    async fn code_exists(&self, code: &str) -> CoreResult<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM urls WHERE short_code = ?) AS e")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        let e: i64 = row.get("e");
        Ok(e != 0)
    }

    async fn soft_delete(&self, code: &str) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE urls SET is_active = 0, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE short_code = ? AND is_active = 1",
        )
        .bind(code)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn batch_increment_hits(&self, deltas: &BTreeMap<String, i64>) -> CoreResult<()> {
        if deltas.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        for (code, delta) in deltas {
            sqlx::query(
                "UPDATE urls SET total_hits = total_hits + ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ','now') WHERE short_code = ?",
            )
            .bind(delta)
            .bind(code)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        }
        tx.commit()
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteUrlStore {
        SqliteUrlStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_then_set_code_round_trips() {
        let store = store().await;
        let placeholder = store.create_placeholder("https://example.com/a").await.unwrap();
        assert!(placeholder.short_code.is_none());
        let record = store.set_short_code(placeholder.id, "abc12").await.unwrap();
        assert_eq!(record.short_code.as_deref(), Some("abc12"));

        let found = store.find_active_by_code("abc12").await.unwrap().unwrap();
        assert_eq!(found.long_url, "https://example.com/a");
    }

    #[tokio::test]
    async fn soft_delete_hides_from_active_lookup_but_keeps_record() {
        let store = store().await;
        let placeholder = store.create_placeholder("https://example.com/a").await.unwrap();
        store.set_short_code(placeholder.id, "abc12").await.unwrap();

        assert!(store.soft_delete("abc12").await.unwrap());
        assert!(store.find_active_by_code("abc12").await.unwrap().is_none());
        assert!(store.find_by_code("abc12").await.unwrap().is_some());

        // idempotent: deleting again reports no row affected
        assert!(!store.soft_delete("abc12").await.unwrap());
    }

    #[tokio::test]
    async fn batch_increment_applies_all_deltas_in_one_transaction() {
        let store = store().await;
        let a = store.create_placeholder("https://a.test").await.unwrap();
        store.set_short_code(a.id, "aaaaa").await.unwrap();
        let b = store.create_placeholder("https://b.test").await.unwrap();
        store.set_short_code(b.id, "bbbbb").await.unwrap();

        let mut deltas = BTreeMap::new();
        deltas.insert("aaaaa".to_string(), 3);
        deltas.insert("bbbbb".to_string(), 5);
        store.batch_increment_hits(&deltas).await.unwrap();

        assert_eq!(
            store.find_by_code("aaaaa").await.unwrap().unwrap().total_hits,
            3
        );
        assert_eq!(
            store.find_by_code("bbbbb").await.unwrap().unwrap().total_hits,
            5
        );
    }
}
