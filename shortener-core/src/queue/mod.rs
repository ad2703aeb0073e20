mod memory;
mod redis_streams;

pub use memory::InMemoryQueue;
pub use redis_streams::RedisStreamQueue;

use crate::error::CoreResult;
use crate::models::{HitEvent, QueueMessage};
use async_trait::async_trait;
use std::time::Duration;

/// Durable FIFO with consumer groups and ACK, between the redirect path and
/// the hit worker.
#[async_trait]
pub trait QueueStrategy: Send + Sync {
    /// Best-effort publish; durable when the remote backend is chosen.
    async fn publish(&self, stream: &str, event: &HitEvent) -> CoreResult<()>;

    /// Blocks up to `block_time` for at least one event, returns up to `batch_size`.
    async fn consume(
        &self,
        stream: &str,
        batch_size: usize,
        block_time: Duration,
    ) -> CoreResult<Vec<QueueMessage>>;

    /// Idempotent: acking an already-acked id is a no-op.
    async fn ack(&self, stream: &str, message_ids: &[String]) -> CoreResult<()>;

    async fn length(&self, stream: &str) -> CoreResult<u64>;
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub url: Option<String>,
    pub stream_name: String,
    pub consumer_group: String,
    pub batch_size: usize,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    Streams,
    Memory,
}
