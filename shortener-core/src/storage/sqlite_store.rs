use super::HitStorageStrategy;
use crate::error::{CoreError, CoreResult};
use crate::models::HitEvent;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

/// Development-grade row-store: one row per hit event in SQLite.
/// Simple, zero external setup, adequate below production volume.
pub struct SqliteHitStorage {
    pool: SqlitePool,
}

impl SqliteHitStorage {
    pub async fn connect(path_or_url: &str) -> CoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(path_or_url)
            .await
            .map_err(|e| CoreError::StorageBackendFailure(e.to_string()))?;
        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> CoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS url_hits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                short_code TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                ip_address TEXT,
                user_agent TEXT,
                referer TEXT,
                country TEXT,
                device_type TEXT,
                browser TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StorageBackendFailure(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_url_hits_short_code ON url_hits(short_code)")
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::StorageBackendFailure(e.to_string()))?;

        Ok(())
    }

    async fn grouped_count(&self, code: &str, column: &str) -> CoreResult<BTreeMap<String, i64>> {
        let sql = format!(
            "SELECT COALESCE({column}, 'unknown') AS label, COUNT(*) AS cnt \
             FROM url_hits WHERE short_code = ? GROUP BY label"
        );
        let rows = sqlx::query(&sql)
            .bind(code)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::StorageBackendFailure(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let label: String = row.get("label");
                let cnt: i64 = row.get("cnt");
                (label, cnt)
            })
            .collect())
    }
}

#[async_trait]
impl HitStorageStrategy for SqliteHitStorage {
    async fn store_hits(&self, events: &[HitEvent]) -> CoreResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::StorageBackendFailure(e.to_string()))?;
        for event in events {
            sqlx::query(
                r#"
                INSERT INTO url_hits (
                    short_code, timestamp, ip_address, user_agent,
                    referer, country, device_type, browser
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&event.short_code)
            .bind(event.timestamp.to_rfc3339())
            .bind(&event.ip_address)
            .bind(&event.user_agent)
            .bind(&event.referer)
            .bind(&event.country)
            .bind(&event.device_type)
            .bind(&event.browser)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::StorageBackendFailure(e.to_string()))?;
        }
        tx.commit()
            .await
            .map_err(|e| CoreError::StorageBackendFailure(e.to_string()))?;
        Ok(())
    }

    async fn total_hits(&self, code: &str) -> CoreResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM url_hits WHERE short_code = ?")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CoreError::StorageBackendFailure(e.to_string()))?;
        Ok(row.get("cnt"))
    }

    async fn hits_by_device(&self, code: &str) -> CoreResult<BTreeMap<String, i64>> {
        self.grouped_count(code, "device_type").await
    }

    async fn hits_by_browser(&self, code: &str) -> CoreResult<BTreeMap<String, i64>> {
        self.grouped_count(code, "browser").await
    }

    async fn hits_by_country(&self, code: &str) -> CoreResult<BTreeMap<String, i64>> {
        self.grouped_count(code, "country").await
    }

    async fn top_referers(&self, code: &str, limit: usize) -> CoreResult<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT referer, COUNT(*) AS cnt
            FROM url_hits
            WHERE short_code = ? AND referer IS NOT NULL
            GROUP BY referer
            ORDER BY cnt DESC, referer ASC
            LIMIT ?
            "#,
        )
        .bind(code)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::StorageBackendFailure(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>("referer"), row.get::<i64, _>("cnt")))
            .collect())
    }

    async fn hits_over_time(&self, code: &str, days: u32) -> CoreResult<Vec<(NaiveDate, i64)>> {
        let start = Utc::now() - ChronoDuration::days(days as i64);
        let rows = sqlx::query(
            r#"
            SELECT DATE(timestamp) AS day, COUNT(*) AS cnt
            FROM url_hits
            WHERE short_code = ? AND timestamp >= ?
            GROUP BY day
            ORDER BY day ASC
            "#,
        )
        .bind(code)
        .bind(start.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::StorageBackendFailure(e.to_string()))?;
        rows.into_iter()
            .map(|row| {
                let day: String = row.get("day");
                let cnt: i64 = row.get("cnt");
                NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                    .map(|d| (d, cnt))
                    .map_err(|e| CoreError::StorageBackendFailure(e.to_string()))
            })
            .collect()
    }

    async fn flush(&self) -> CoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage() -> SqliteHitStorage {
        SqliteHitStorage::connect("sqlite::memory:").await.unwrap()
    }

    fn hit(code: &str, referer: Option<&str>) -> HitEvent {
        let mut e = HitEvent::new(code);
        e.referer = referer.map(|s| s.to_string());
        e
    }

    #[tokio::test]
    async fn total_hits_counts_stored_events() {
        let storage = storage().await;
        storage
            .store_hits(&[hit("abc12", None), hit("abc12", None), hit("zzz", None)])
            .await
            .unwrap();
        assert_eq!(storage.total_hits("abc12").await.unwrap(), 2);
        assert_eq!(storage.total_hits("zzz").await.unwrap(), 1);
        assert_eq!(storage.total_hits("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn top_referers_orders_by_count_desc_then_lexicographic() {
        let storage = storage().await;
        storage
            .store_hits(&[
                hit("abc12", Some("https://a.test")),
                hit("abc12", Some("https://b.test")),
                hit("abc12", Some("https://b.test")),
                hit("abc12", Some("https://a.test")),
                hit("abc12", Some("https://z.test")),
            ])
            .await
            .unwrap();
        let top = storage.top_referers("abc12", 10).await.unwrap();
        assert_eq!(
            top,
            vec![
                ("https://a.test".to_string(), 2),
                ("https://b.test".to_string(), 2),
                ("https://z.test".to_string(), 1),
            ]
        );
    }

    #[tokio::test]
    async fn grouped_counts_bucket_missing_labels_as_unknown() {
        let storage = storage().await;
        storage.store_hits(&[HitEvent::new("abc12")]).await.unwrap();
        let by_device = storage.hits_by_device("abc12").await.unwrap();
        assert_eq!(by_device.get("unknown"), Some(&1));
    }
}
