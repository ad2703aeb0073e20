use crate::error::CoreResult;
use crate::queue::QueueStrategy;
use crate::storage::HitStorageStrategy;
use crate::store::UrlStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct HitWorkerConfig {
    pub stream_name: String,
    pub batch_size: usize,
    pub block_time: Duration,
    pub flush_interval: Duration,
    /// Bound on the final drain-and-flush after a shutdown signal. If the
    /// in-flight batch's storage/store calls don't complete within this
    /// window, `run` returns anyway and the unacked messages are left for
    /// redelivery to the next consumer.
    pub shutdown_deadline: Duration,
}

/// Consumes hit events off the queue, aggregates in-memory counters, and
/// periodically commits them to both the row-store aggregate columns
/// (`UrlStore::batch_increment_hits`) and the analytics backend
/// (`HitStorageStrategy::store_hits`).
///
/// The flush cadence is driven by a monotonic `tokio::time::Instant`, not
/// wall-clock subtraction (which truncates to whole seconds and can skip a
/// flush window entirely), and the "flushed N urls" log fires before the
/// counters are cleared rather than after, so it reports the batch size it
/// actually flushed instead of always logging zero.
pub struct HitWorker {
    queue: Arc<dyn QueueStrategy>,
    storage: Arc<dyn HitStorageStrategy>,
    store: Arc<dyn UrlStore>,
    config: HitWorkerConfig,
}

impl HitWorker {
    pub fn new(
        queue: Arc<dyn QueueStrategy>,
        storage: Arc<dyn HitStorageStrategy>,
        store: Arc<dyn UrlStore>,
        config: HitWorkerConfig,
    ) -> Self {
        Self {
            queue,
            storage,
            store,
            config,
        }
    }

    /// Runs until `shutdown` reports true, then performs one final flush
    /// before returning so no acked-but-uncounted hits are lost.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> CoreResult<()> {
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        let mut pending_acks: Vec<String> = Vec::new();
        let mut last_flush = Instant::now();

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                batch = self.queue.consume(&self.config.stream_name, self.config.batch_size, self.config.block_time) => {
                    match batch {
                        Ok(messages) => {
                            if !messages.is_empty() {
                                let events: Vec<_> = messages.iter().map(|m| m.event.clone()).collect();
                                match self.storage.store_hits(&events).await {
                                    Ok(()) => {
                                        for message in messages {
                                            *counts.entry(message.event.short_code).or_insert(0) += 1;
                                            pending_acks.push(message.message_id);
                                        }
                                    }
                                    Err(e) => {
                                        tracing::error!(error = %e, count = events.len(), "hit storage append failed, leaving batch unacked for redelivery");
                                        tokio::time::sleep(Duration::from_millis(100)).await;
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "queue consume failed, backing off");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }

            if last_flush.elapsed() >= self.config.flush_interval || counts.len() >= self.config.batch_size {
                self.flush(&mut counts, &mut pending_acks).await;
                last_flush = Instant::now();
            }
        }

        let drain = async {
            self.flush(&mut counts, &mut pending_acks).await;
            self.storage.flush().await
        };
        match tokio::time::timeout(self.config.shutdown_deadline, drain).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    "shutdown deadline elapsed before drain completed, exiting with messages pending redelivery"
                );
            }
        }
        Ok(())
    }

    async fn flush(&self, counts: &mut BTreeMap<String, i64>, pending_acks: &mut Vec<String>) {
        if counts.is_empty() {
            return;
        }

        match self.store.batch_increment_hits(counts).await {
            Ok(()) => {
                tracing::info!(urls = counts.len(), "flushed total_hits for {} urls", counts.len());
                counts.clear();

                if !pending_acks.is_empty() {
                    if let Err(e) = self.queue.ack(&self.config.stream_name, pending_acks).await {
                        tracing::error!(error = %e, "queue ack failed after successful flush");
                    }
                    pending_acks.clear();
                }
            }
            Err(e) => {
                tracing::error!(error = %e, urls = counts.len(), "total_hits flush failed, retaining counters for retry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HitEvent;
    use crate::queue::InMemoryQueue;
    use crate::storage::SqliteHitStorage;
    use crate::store::SqliteUrlStore;

    async fn harness() -> (Arc<InMemoryQueue>, Arc<SqliteHitStorage>, Arc<SqliteUrlStore>) {
        let queue = Arc::new(InMemoryQueue::new());
        let storage = Arc::new(SqliteHitStorage::connect("sqlite::memory:").await.unwrap());
        let store = Arc::new(SqliteUrlStore::connect("sqlite::memory:").await.unwrap());
        (queue, storage, store)
    }

    #[tokio::test]
    async fn property_exactly_once_counting_per_run() {
        let (queue, storage, store) = harness().await;
        let placeholder = store.create_placeholder("https://example.com").await.unwrap();
        store.set_short_code(placeholder.id, "abc12").await.unwrap();

        for _ in 0..7 {
            queue.publish("hits", &HitEvent::new("abc12")).await.unwrap();
        }

        let worker = HitWorker::new(
            Arc::clone(&queue) as Arc<dyn QueueStrategy>,
            Arc::clone(&storage) as Arc<dyn HitStorageStrategy>,
            Arc::clone(&store) as Arc<dyn UrlStore>,
            HitWorkerConfig {
                stream_name: "hits".to_string(),
                batch_size: 100,
                block_time: Duration::from_millis(20),
                flush_interval: Duration::from_millis(10),
                shutdown_deadline: Duration::from_secs(5),
            },
        );

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });
        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let record = store.find_by_code("abc12").await.unwrap().unwrap();
        assert_eq!(record.total_hits, 7);
        assert_eq!(queue.length("hits").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn property_shutdown_flushes_remainder_below_batch_size() {
        let (queue, storage, store) = harness().await;
        let placeholder = store.create_placeholder("https://example.com").await.unwrap();
        store.set_short_code(placeholder.id, "zz999").await.unwrap();
        queue.publish("hits", &HitEvent::new("zz999")).await.unwrap();

        let worker = HitWorker::new(
            Arc::clone(&queue) as Arc<dyn QueueStrategy>,
            Arc::clone(&storage) as Arc<dyn HitStorageStrategy>,
            Arc::clone(&store) as Arc<dyn UrlStore>,
            HitWorkerConfig {
                stream_name: "hits".to_string(),
                batch_size: 1000,
                block_time: Duration::from_millis(20),
                flush_interval: Duration::from_secs(3600),
                shutdown_deadline: Duration::from_secs(5),
            },
        );

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let record = store.find_by_code("zz999").await.unwrap().unwrap();
        assert_eq!(record.total_hits, 1);
    }
}
