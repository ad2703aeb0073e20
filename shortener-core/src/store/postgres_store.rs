use super::UrlStore;
use crate::error::{CoreError, CoreResult};
use crate::models::UrlRecord;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Row};
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

/// Postgres-backed authoritative store. Schema bootstrap follows the
/// teacher's advisory-lock-guarded `CREATE TABLE IF NOT EXISTS` so multiple
/// replicas starting simultaneously don't race on DDL.
pub struct PostgresUrlStore {
    pool: PgPool,
}

impl PostgresUrlStore {
    pub async fn connect(database_url: &str) -> CoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .connect(database_url)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> CoreResult<()> {
        sqlx::query("SELECT pg_advisory_lock(918273645)")
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        let result = sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS urls (
                id          BIGSERIAL PRIMARY KEY,
                long_url    TEXT NOT NULL,
                short_code  VARCHAR(20) UNIQUE,
                total_hits  BIGINT NOT NULL DEFAULT 0,
                is_active   BOOLEAN NOT NULL DEFAULT TRUE,
                created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await;

        sqlx::query("SELECT pg_advisory_unlock(918273645)")
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;

        result
            .map(|_| ())
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))
    }
}

#[async_trait]
impl UrlStore for PostgresUrlStore {
    async fn create_placeholder(&self, long_url: &str) -> CoreResult<UrlRecord> {
        let row: UrlRow = sqlx::query_as(
            r#"
            INSERT INTO urls (long_url, short_code)
            VALUES ($1, NULL)
            RETURNING id, long_url, short_code, total_hits, is_active, created_at, updated_at
            "#,
        )
        .bind(long_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        Ok(row.into())
    }

    async fn set_short_code(&self, id: i64, code: &str) -> CoreResult<UrlRecord> {
        let row: UrlRow = sqlx::query_as(
            r#"
            UPDATE urls SET short_code = $1, updated_at = now()
            WHERE id = $2
            RETURNING id, long_url, short_code, total_hits, is_active, created_at, updated_at
            "#,
        )
        .bind(code)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        Ok(row.into())
    }

    async fn find_active_by_code(&self, code: &str) -> CoreResult<Option<UrlRecord>> {
        let row: Option<UrlRow> = sqlx::query_as(
            r#"
            SELECT id, long_url, short_code, total_hits, is_active, created_at, updated_at
            FROM urls WHERE short_code = $1 AND is_active
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        Ok(row.map(Into::into))
    }

    async fn find_by_code(&self, code: &str) -> CoreResult<Option<UrlRecord>> {
        let row: Option<UrlRow> = sqlx::query_as(
            r#"
            SELECT id, long_url, short_code, total_hits, is_active, created_at, updated_at
            FROM urls WHERE short_code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        Ok(row.map(Into::into))
    }

    async fn code_exists(&self, code: &str) -> CoreResult<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM urls WHERE short_code = $1) AS e")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CoreError::StorageUnavailable(e.to_string()))?;
        Ok(row.get("e"))
    }

    async fn soft_delete(&self, code: &str) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE urls SET is_active = FALSE, updated_at = now() WHERE short_code = $1 AND is_active",
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
                "UPDATE urls SET total_hits = total_hits + $1, updated_at = now() WHERE short_code = $2",
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
