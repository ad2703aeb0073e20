use super::HitStorageStrategy;
use crate::error::{CoreError, CoreResult};
use crate::models::HitEvent;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

struct Inner {
    http: reqwest::Client,
    base_url: String,
    database: String,
    buffer: Mutex<Vec<HitEvent>>,
    buffer_size: usize,
    failed_tx: Option<mpsc::UnboundedSender<Vec<HitEvent>>>,
}

impl Inner {
    fn query_url(&self, query: &str) -> String {
        format!(
            "{}/?query={}",
            self.base_url,
            urlencoding_like(query)
        )
    }

    async fn flush_locked(&self, buffer: &mut Vec<HitEvent>) {
        if buffer.is_empty() {
            return;
        }
        let batch = std::mem::take(buffer);
        if let Err(e) = self.insert_rows(&batch).await {
            tracing::error!(error = %e, count = batch.len(), "clickhouse flush failed, surrendering batch");
            if let Some(tx) = &self.failed_tx {
                let _ = tx.send(batch);
            }
        }
    }

    async fn insert_rows(&self, events: &[HitEvent]) -> CoreResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let rows: String = events
            .iter()
            .map(|e| {
                format!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    e.timestamp.to_rfc3339(),
                    e.short_code,
                    e.ip_address.as_deref().unwrap_or(""),
                    e.user_agent.as_deref().unwrap_or(""),
                    e.referer.as_deref().unwrap_or(""),
                    e.country.as_deref().unwrap_or(""),
                    e.device_type.as_deref().unwrap_or(""),
                    e.browser.as_deref().unwrap_or(""),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let url = format!(
            "{}/?query=INSERT INTO {}.url_hits FORMAT TabSeparated",
            self.base_url, self.database
        );
        self.http
            .post(&url)
            .body(rows)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CoreError::StorageBackendFailure(e.to_string()))?;
        Ok(())
    }

    async fn json_query(&self, query: &str) -> CoreResult<Value> {
        let url = self.query_url(&format!("{query} FORMAT JSON"));
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CoreError::StorageBackendFailure(e.to_string()))?;
        resp.json::<Value>()
            .await
            .map_err(|e| CoreError::StorageBackendFailure(e.to_string()))
    }
}

fn urlencoding_like(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            ' ' => "%20".to_string(),
            '\'' => "%27".to_string(),
            c if c.is_ascii_alphanumeric() || "-_.~".contains(c) => c.to_string(),
            c => format!("%{:02X}", c as u32),
        })
        .collect()
}

fn escape_sql(s: &str) -> String {
    s.replace('\'', "\\'")
}

/// Production column-store backed by ClickHouse's HTTP interface.
///
/// Buffers events and flushes on three triggers: buffer_size reached,
/// a periodic ticker, and an explicit `flush()` call on shutdown — the
/// periodic and shutdown triggers close the gap a size-only trigger leaves
/// open (a straggler batch below buffer_size would otherwise sit unflushed).
pub struct ClickHouseHitStorage {
    inner: Arc<Inner>,
    _ticker: tokio::task::JoinHandle<()>,
}

impl ClickHouseHitStorage {
    pub async fn connect(
        base_url: &str,
        database: &str,
        buffer_size: usize,
        flush_interval: Duration,
        failed_tx: Option<mpsc::UnboundedSender<Vec<HitEvent>>>,
    ) -> CoreResult<Self> {
        let inner = Arc::new(Inner {
            http: reqwest::Client::new(),
            base_url: base_url.to_string(),
            database: database.to_string(),
            buffer: Mutex::new(Vec::new()),
            buffer_size,
            failed_tx,
        });
        inner.ensure_table().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "clickhouse table bootstrap failed (will retry on next write)")
        });

        let ticker_inner = Arc::clone(&inner);
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(flush_interval);
            loop {
                interval.tick().await;
                let mut buffer = ticker_inner.buffer.lock().await;
                ticker_inner.flush_locked(&mut buffer).await;
            }
        });

        Ok(Self {
            inner,
            _ticker: ticker,
        })
    }
}

impl Inner {
    async fn ensure_table(&self) -> CoreResult<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {}.url_hits \
             (timestamp DateTime, short_code String, ip_address String, user_agent String, \
              referer String, country String, device_type String, browser String) \
             ENGINE = MergeTree ORDER BY (short_code, timestamp)",
            self.database
        );
        self.http
            .post(&self.base_url)
            .body(ddl)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CoreError::StorageBackendFailure(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl HitStorageStrategy for ClickHouseHitStorage {
    async fn store_hits(&self, events: &[HitEvent]) -> CoreResult<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut buffer = self.inner.buffer.lock().await;
        buffer.extend_from_slice(events);
        if buffer.len() >= self.inner.buffer_size {
            self.inner.flush_locked(&mut buffer).await;
        }
        Ok(())
    }

    async fn total_hits(&self, code: &str) -> CoreResult<i64> {
        let query = format!(
            "SELECT COUNT(*) AS cnt FROM {}.url_hits WHERE short_code = '{}'",
            self.inner.database,
            escape_sql(code)
        );
        let data = self.inner.json_query(&query).await?;
        Ok(data["data"][0]["cnt"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .or_else(|| data["data"][0]["cnt"].as_i64())
            .unwrap_or(0))
    }

    async fn hits_by_device(&self, code: &str) -> CoreResult<BTreeMap<String, i64>> {
        grouped(&self.inner, code, "device_type").await
    }

    async fn hits_by_browser(&self, code: &str) -> CoreResult<BTreeMap<String, i64>> {
        grouped(&self.inner, code, "browser").await
    }

    async fn hits_by_country(&self, code: &str) -> CoreResult<BTreeMap<String, i64>> {
        grouped(&self.inner, code, "country").await
    }

    async fn top_referers(&self, code: &str, limit: usize) -> CoreResult<Vec<(String, i64)>> {
        let query = format!(
            "SELECT referer, COUNT(*) AS cnt FROM {}.url_hits \
             WHERE short_code = '{}' AND referer != '' \
             GROUP BY referer ORDER BY cnt DESC, referer ASC LIMIT {}",
            self.inner.database,
            escape_sql(code),
            limit
        );
        let data = self.inner.json_query(&query).await?;
        Ok(rows_of(&data)
            .map(|row| {
                (
                    row["referer"].as_str().unwrap_or_default().to_string(),
                    row["cnt"].as_i64().unwrap_or(0),
                )
            })
            .collect())
    }

    async fn hits_over_time(&self, code: &str, days: u32) -> CoreResult<Vec<(NaiveDate, i64)>> {
        let query = format!(
            "SELECT toDate(timestamp) AS day, COUNT(*) AS cnt FROM {}.url_hits \
             WHERE short_code = '{}' AND timestamp >= now() - INTERVAL {} DAY \
             GROUP BY day ORDER BY day ASC",
            self.inner.database,
            escape_sql(code),
            days
        );
        let data = self.inner.json_query(&query).await?;
        rows_of(&data)
            .map(|row| {
                let day = row["day"].as_str().unwrap_or_default();
                NaiveDate::parse_from_str(day, "%Y-%m-%d")
                    .map(|d| (d, row["cnt"].as_i64().unwrap_or(0)))
                    .map_err(|e| CoreError::StorageBackendFailure(e.to_string()))
            })
            .collect()
    }

    async fn flush(&self) -> CoreResult<()> {
        let mut buffer = self.inner.buffer.lock().await;
        self.inner.flush_locked(&mut buffer).await;
        Ok(())
    }
}

fn rows_of(data: &Value) -> impl Iterator<Item = &Value> {
    data["data"].as_array().into_iter().flatten()
}

async fn grouped(inner: &Inner, code: &str, column: &str) -> CoreResult<BTreeMap<String, i64>> {
    let query = format!(
        "SELECT {column} AS label, COUNT(*) AS cnt FROM {}.url_hits \
         WHERE short_code = '{}' GROUP BY label",
        inner.database,
        escape_sql(code)
    );
    let data = inner.json_query(&query).await?;
    Ok(rows_of(&data)
        .map(|row| {
            let label = row["label"].as_str().filter(|s| !s.is_empty()).unwrap_or("unknown");
            (label.to_string(), row["cnt"].as_i64().unwrap_or(0))
        })
        .collect())
}

impl Drop for ClickHouseHitStorage {
    fn drop(&mut self) {
        self._ticker.abort();
    }
}
