use super::QueueStrategy;
use crate::error::{CoreError, CoreResult};
use crate::models::{HitEvent, QueueMessage};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;

/// Redis Streams queue with consumer groups. The group is created lazily on
/// first use per stream, tolerating `BUSYGROUP` (group already exists).
pub struct RedisStreamQueue {
    conn: Mutex<ConnectionManager>,
    consumer_group: String,
    consumer_name: String,
    initialized_streams: Mutex<HashSet<String>>,
}

impl RedisStreamQueue {
    pub async fn connect(url: &str, consumer_group: &str, consumer_name: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn: Mutex::new(conn),
            consumer_group: consumer_group.to_string(),
            consumer_name: consumer_name.to_string(),
            initialized_streams: Mutex::new(HashSet::new()),
        })
    }

    async fn ensure_stream(&self, stream: &str, conn: &mut ConnectionManager) {
        {
            let seen = self.initialized_streams.lock().await;
            if seen.contains(stream) {
                return;
            }
        }
        let res: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(stream, &self.consumer_group, "0")
            .await;
        if let Err(e) = res {
            if !e.to_string().contains("BUSYGROUP") {
                tracing::warn!(error = %e, stream, "stream/group creation warning");
            }
        }
        self.initialized_streams
            .lock()
            .await
            .insert(stream.to_string());
    }
}

#[async_trait]
impl QueueStrategy for RedisStreamQueue {
    async fn publish(&self, stream: &str, event: &HitEvent) -> CoreResult<()> {
        let mut conn = self.conn.lock().await;
        self.ensure_stream(stream, &mut conn).await;
        let payload = serde_json::to_string(event)
            .map_err(|e| CoreError::QueueUnavailable(e.to_string()))?;
        conn.xadd::<_, _, _, _, String>(stream, "*", &[("data", payload)])
            .await
            .map(|_| ())
            .map_err(|e| CoreError::QueueUnavailable(e.to_string()))
    }

    async fn consume(
        &self,
        stream: &str,
        batch_size: usize,
        block_time: Duration,
    ) -> CoreResult<Vec<QueueMessage>> {
        let mut conn = self.conn.lock().await;
        self.ensure_stream(stream, &mut conn).await;

        let opts = StreamReadOptions::default()
            .group(&self.consumer_group, &self.consumer_name)
            .count(batch_size)
            .block(block_time.as_millis() as usize);

        let reply: StreamReadReply = conn
            .xread_options(&[stream], &[">"], &opts)
            .await
            .map_err(|e| CoreError::QueueUnavailable(e.to_string()))?;

        let mut out = Vec::new();
        for stream_key in reply.keys {
            for id in stream_key.ids {
                let data = id
                    .map
                    .get("data")
                    .and_then(|v| match v {
                        redis::Value::Data(bytes) => Some(bytes.clone()),
                        _ => None,
                    });
                let Some(bytes) = data else {
                    tracing::warn!(message_id = %id.id, "stream message missing data field");
                    continue;
                };
                match serde_json::from_slice::<HitEvent>(&bytes) {
                    Ok(event) => out.push(QueueMessage {
                        message_id: id.id,
                        event,
                    }),
                    Err(e) => tracing::warn!(error = %e, message_id = %id.id, "failed to parse hit event"),
                }
            }
        }
        Ok(out)
    }

    async fn ack(&self, stream: &str, message_ids: &[String]) -> CoreResult<()> {
        if message_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().await;
        conn.xack::<_, _, _, i64>(stream, &self.consumer_group, message_ids)
            .await
            .map(|_| ())
            .map_err(|e| CoreError::QueueUnavailable(e.to_string()))
    }

    async fn length(&self, stream: &str) -> CoreResult<u64> {
        let mut conn = self.conn.lock().await;
        conn.xlen::<_, u64>(stream)
            .await
            .map_err(|e| CoreError::QueueUnavailable(e.to_string()))
    }
}
