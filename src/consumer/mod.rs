use std::sync::Arc;

use tokio::sync::watch;

use crate::cache::BoundedCache;
use crate::messaging::{StreamMessage, StreamSource};
use crate::metrics::Metrics;
use crate::models::Order;
use crate::store::OrderStore;
use crate::utils::Backoff;

// ============================================================================
// Stream Consumer - fetch → deserialize → persist → cache → commit
// ============================================================================
//
// One message at a time, in partition arrival order; a message's full
// pipeline runs to completion before the next fetch. The offset is only
// committed after the order is durable, so a crash between persist and
// commit redelivers the message and the store's upsert absorbs the
// duplicate (at-least-once).
//
// Failure policy per stage:
// - undecodable payload: skip, no commit. Redelivered on restart; there is
//   no dead-letter topic, so a permanently malformed message is skipped
//   again on every redelivery.
// - persist failure: skip, no commit.
// - cache population: best-effort, cannot fail the message.
// - commit failure: logged only; the order is already durable.
//
// ============================================================================

pub struct IngestConsumer<S: StreamSource> {
    source: S,
    store: Arc<dyn OrderStore>,
    cache: Arc<BoundedCache<Order>>,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
    backoff: Backoff,
}

impl<S: StreamSource> IngestConsumer<S> {
    pub fn new(
        source: S,
        store: Arc<dyn OrderStore>,
        cache: Arc<BoundedCache<Order>>,
        metrics: Arc<Metrics>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            store,
            cache,
            metrics,
            shutdown,
            backoff: Backoff::default(),
        }
    }

    /// Drives the fetch-process-commit loop until the shutdown signal
    /// flips. The shutdown channel is observed before every blocking fetch;
    /// on cancellation the in-flight fetch is dropped uncommitted and the
    /// stream handle is released.
    pub async fn run(mut self) {
        tracing::info!("stream consumer started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let fetched = tokio::select! {
                _ = self.shutdown.changed() => break,
                fetched = self.source.fetch_next() => fetched,
            };

            match fetched {
                Ok(message) => {
                    self.backoff.reset();
                    self.process(message).await;
                }
                Err(error) => {
                    let delay = self.backoff.next_delay();
                    tracing::warn!(
                        error = %error,
                        delay_ms = delay.as_millis() as u64,
                        "fetch failed, backing off"
                    );
                    tokio::select! {
                        _ = self.shutdown.changed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.source.close();
        tracing::info!("stream consumer stopped");
    }

    async fn process(&mut self, message: StreamMessage) {
        let order: Order = match serde_json::from_slice(&message.payload) {
            Ok(order) => order,
            Err(error) => {
                self.metrics
                    .messages_skipped
                    .with_label_values(&["deserialize"])
                    .inc();
                tracing::warn!(
                    key = message.key.as_deref().unwrap_or(""),
                    partition = message.partition,
                    offset = message.offset,
                    error = %error,
                    "undecodable payload, skipping message"
                );
                return;
            }
        };

        if let Err(error) = self.store.save(&order).await {
            self.metrics
                .messages_skipped
                .with_label_values(&["persist"])
                .inc();
            tracing::warn!(
                order_uid = %order.order_uid,
                error = %error,
                "persist failed, leaving message uncommitted"
            );
            return;
        }

        // Only after the order is durable; never blocks the commit.
        self.cache.insert(order.order_uid.clone(), order.clone());

        if let Err(error) = self.source.commit(&message).await {
            self.metrics.commit_failures.inc();
            tracing::warn!(
                order_uid = %order.order_uid,
                error = %error,
                "offset commit failed, redelivery expected"
            );
            return;
        }

        self.metrics.messages_consumed.inc();
        tracing::info!(
            order_uid = %order.order_uid,
            partition = message.partition,
            offset = message.offset,
            "order ingested"
        );
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::StreamError;
    use crate::models::fixtures::sample_order;
    use crate::store::mock::MemoryStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Source that replays a scripted message sequence, then pends until
    /// shutdown. Commits and close are recorded for assertions.
    #[derive(Clone, Default)]
    struct ScriptedSource {
        messages: Arc<Mutex<VecDeque<Result<StreamMessage, StreamError>>>>,
        committed: Arc<Mutex<Vec<i64>>>,
        closed: Arc<AtomicBool>,
        fetches: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn with_messages(
            messages: impl IntoIterator<Item = Result<StreamMessage, StreamError>>,
        ) -> Self {
            let source = Self::default();
            source.messages.lock().extend(messages);
            source
        }

        fn push(&self, message: Result<StreamMessage, StreamError>) {
            self.messages.lock().push_back(message);
        }

        fn committed_offsets(&self) -> Vec<i64> {
            self.committed.lock().clone()
        }
    }

    #[async_trait]
    impl StreamSource for ScriptedSource {
        async fn fetch_next(&mut self) -> Result<StreamMessage, StreamError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let next = self.messages.lock().pop_front();
            match next {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }

        async fn commit(&mut self, message: &StreamMessage) -> Result<(), StreamError> {
            self.committed.lock().push(message.offset);
            Ok(())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn message_at(offset: i64, payload: Vec<u8>) -> StreamMessage {
        StreamMessage {
            key: None,
            payload,
            topic: "orders".to_string(),
            partition: 0,
            offset,
        }
    }

    fn order_message(offset: i64, order_uid: &str) -> StreamMessage {
        let payload = serde_json::to_vec(&sample_order(order_uid)).unwrap();
        message_at(offset, payload)
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition()
    }

    fn build_consumer(
        source: ScriptedSource,
        store: Arc<MemoryStore>,
    ) -> (
        IngestConsumer<ScriptedSource>,
        Arc<BoundedCache<Order>>,
        watch::Sender<bool>,
    ) {
        let cache = Arc::new(BoundedCache::new(10).unwrap());
        let metrics = Arc::new(Metrics::new().unwrap());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = IngestConsumer::new(source, store, cache.clone(), metrics, shutdown_rx);
        (consumer, cache, shutdown_tx)
    }

    #[tokio::test]
    async fn test_poison_message_skipped_and_valid_one_ingested() {
        let source = ScriptedSource::with_messages([
            Ok(message_at(0, b"{not json".to_vec())),
            Ok(order_message(1, "o-1")),
        ]);
        let store = Arc::new(MemoryStore::new());
        let (consumer, cache, shutdown_tx) = build_consumer(source.clone(), store.clone());

        let handle = tokio::spawn(consumer.run());
        assert!(wait_until(|| source.committed_offsets() == vec![1]).await);

        // The poison message left no record and no commit; the loop went on.
        assert!(store.contains("o-1"));
        assert_eq!(store.stored_len(), 1);
        assert!(cache.get("o-1").is_some());
        assert_eq!(source.committed_offsets(), vec![1]);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_no_commit_without_successful_persist() {
        let source = ScriptedSource::with_messages([Ok(order_message(0, "o-crash"))]);
        let store = Arc::new(MemoryStore::new());
        store.fail_saves(true);
        let (consumer, cache, shutdown_tx) = build_consumer(source.clone(), store.clone());

        let handle = tokio::spawn(consumer.run());
        assert!(wait_until(|| store.save_count() >= 1).await);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        // Persist failed, so nothing was cached and the offset never moved.
        assert!(source.committed_offsets().is_empty());
        assert!(!store.contains("o-crash"));
        assert!(cache.get("o-crash").is_none());

        // Restart after the simulated crash: the same message is fetched
        // again and this time runs the full pipeline.
        store.fail_saves(false);
        let source = ScriptedSource::with_messages([Ok(order_message(0, "o-crash"))]);
        let (consumer, cache, shutdown_tx) = build_consumer(source.clone(), store.clone());
        let handle = tokio::spawn(consumer.run());
        assert!(wait_until(|| source.committed_offsets() == vec![0]).await);

        assert!(store.contains("o-crash"));
        assert!(cache.get("o-crash").is_some());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_redelivered_message_converges_to_one_record() {
        let source = ScriptedSource::with_messages([
            Ok(order_message(0, "o-dup")),
            Ok(order_message(1, "o-dup")),
        ]);
        let store = Arc::new(MemoryStore::new());
        let (consumer, _cache, shutdown_tx) = build_consumer(source.clone(), store.clone());

        let handle = tokio::spawn(consumer.run());
        assert!(wait_until(|| source.committed_offsets() == vec![0, 1]).await);

        // Upsert semantics: two deliveries, one observable record.
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.stored_len(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_transient_fetch_errors_do_not_kill_the_loop() {
        let source = ScriptedSource::with_messages([
            Err(StreamError::Unavailable("broker hiccup".to_string())),
            Err(StreamError::Unavailable("broker hiccup".to_string())),
            Ok(order_message(2, "o-after-errors")),
        ]);
        let store = Arc::new(MemoryStore::new());
        let (consumer, _cache, shutdown_tx) = build_consumer(source.clone(), store.clone());

        let handle = tokio::spawn(consumer.run());
        assert!(wait_until(|| source.committed_offsets() == vec![2]).await);
        assert!(store.contains("o-after-errors"));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_joins_promptly_and_releases_source() {
        let source = ScriptedSource::default();
        let store = Arc::new(MemoryStore::new());
        let (consumer, _cache, shutdown_tx) = build_consumer(source.clone(), store.clone());

        let handle = tokio::spawn(consumer.run());
        // Let the loop park on the (empty) fetch before signalling.
        assert!(wait_until(|| source.fetches.load(Ordering::SeqCst) >= 1).await);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("consumer should stop promptly on shutdown")
            .unwrap();

        assert!(source.closed.load(Ordering::SeqCst));
        assert!(source.committed_offsets().is_empty());
    }

    #[tokio::test]
    async fn test_messages_processed_in_arrival_order() {
        let source = ScriptedSource::default();
        for offset in 0..5 {
            source.push(Ok(order_message(offset, &format!("o-{offset}"))));
        }
        let store = Arc::new(MemoryStore::new());
        let (consumer, _cache, shutdown_tx) = build_consumer(source.clone(), store.clone());

        let handle = tokio::spawn(consumer.run());
        assert!(wait_until(|| source.committed_offsets().len() == 5).await);

        assert_eq!(source.committed_offsets(), vec![0, 1, 2, 3, 4]);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
