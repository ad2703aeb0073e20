use super::QueueStrategy;
use crate::error::CoreResult;
use crate::models::{HitEvent, QueueMessage};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Single-process FIFO. `ack` is a documented no-op: messages are removed
/// from the queue at `consume` time, so there is no pending list to clear.
/// Not durable across process restarts — use a networked backend for
/// multi-process deployments.
#[derive(Default)]
pub struct InMemoryQueue {
    streams: Mutex<HashMap<String, VecDeque<QueueMessage>>>,
    next_id: AtomicU64,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStrategy for InMemoryQueue {
    async fn publish(&self, stream: &str, event: &HitEvent) -> CoreResult<()> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut streams = self.streams.lock().await;
        streams
            .entry(stream.to_string())
            .or_default()
            .push_back(QueueMessage {
                message_id: id.to_string(),
                event: event.clone(),
            });
        Ok(())
    }

    async fn consume(
        &self,
        stream: &str,
        batch_size: usize,
        block_time: Duration,
    ) -> CoreResult<Vec<QueueMessage>> {
        let deadline = Instant::now() + block_time;
        loop {
            {
                let mut streams = self.streams.lock().await;
                if let Some(queue) = streams.get_mut(stream) {
                    if !queue.is_empty() {
                        let drained: Vec<_> = (0..batch_size.min(queue.len()))
                            .filter_map(|_| queue.pop_front())
                            .collect();
                        return Ok(drained);
                    }
                }
            }
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(Duration::from_millis(10).min(block_time)).await;
        }
    }

    async fn ack(&self, _stream: &str, _message_ids: &[String]) -> CoreResult<()> {
        Ok(())
    }

    async fn length(&self, stream: &str) -> CoreResult<u64> {
        let streams = self.streams.lock().await;
        Ok(streams.get(stream).map(|q| q.len()).unwrap_or(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_consume_round_trips() {
        let queue = InMemoryQueue::new();
        let event = HitEvent::new("abc12");
        queue.publish("hits", &event).await.unwrap();
        let batch = queue
            .consume("hits", 10, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].event, event);
    }

    #[tokio::test]
    async fn consume_blocks_and_times_out_when_empty() {
        let queue = InMemoryQueue::new();
        let start = Instant::now();
        let batch = queue
            .consume("hits", 10, Duration::from_millis(30))
            .await
            .unwrap();
        assert!(batch.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn ack_is_idempotent_noop() {
        let queue = InMemoryQueue::new();
        queue.ack("hits", &["1".to_string()]).await.unwrap();
        queue.ack("hits", &["1".to_string()]).await.unwrap();
    }

    #[tokio::test]
    async fn respects_batch_size() {
        let queue = InMemoryQueue::new();
        for _ in 0..5 {
            queue.publish("hits", &HitEvent::new("x")).await.unwrap();
        }
        let batch = queue
            .consume("hits", 3, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(queue.length("hits").await.unwrap(), 2);
    }
}
