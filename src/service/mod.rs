use std::sync::Arc;

use chrono::Utc;

use crate::cache::BoundedCache;
use crate::messaging::{StreamError, StreamPublisher};
use crate::metrics::Metrics;
use crate::models::{Order, ValidationError};
use crate::store::{OrderStore, StoreError};

// ============================================================================
// Order Service - read-through lookups and write acceptance
// ============================================================================
//
// Reads check the cache before the store and repopulate it on a miss.
// Writes never touch the store or cache directly: a validated order is
// published to the stream and becomes durable only once the consumer loop
// ingests it, so read-after-write is eventually consistent.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid order: {0}")]
    Validation(#[from] ValidationError),

    #[error("order {0} not found")]
    NotFound(String),

    #[error("lookup failed: {0}")]
    Store(StoreError),

    #[error("order encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("publish failed: {0}")]
    Publish(#[from] StreamError),
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    cache: Arc<BoundedCache<Order>>,
    publisher: Arc<dyn StreamPublisher>,
    metrics: Arc<Metrics>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: Arc<BoundedCache<Order>>,
        publisher: Arc<dyn StreamPublisher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            cache,
            publisher,
            metrics,
        }
    }

    /// Cache-first lookup. A hit never touches the store; a miss is read
    /// through and populates the cache, so the next lookup for the same id
    /// is a hit. A failed store read leaves the cache untouched.
    pub async fn get_order(&self, order_uid: &str) -> Result<Order, ServiceError> {
        let _timer = self.metrics.lookup_duration.start_timer();

        if let Some(order) = self.cache.get(order_uid) {
            self.metrics.cache_hits.inc();
            tracing::debug!(order_uid, "cache hit");
            return Ok(order);
        }
        self.metrics.cache_misses.inc();

        let order = match self.store.get_by_id(order_uid).await {
            Ok(order) => order,
            Err(StoreError::NotFound(uid)) => return Err(ServiceError::NotFound(uid)),
            Err(error) => return Err(ServiceError::Store(error)),
        };

        self.cache.insert(order.order_uid.clone(), order.clone());
        tracing::debug!(order_uid, "cache miss, read through from store");
        Ok(order)
    }

    /// Validates and publishes an order for asynchronous ingestion. The
    /// creation timestamp is stamped server-side; persistence happens only
    /// once the consumer picks the message up.
    pub async fn submit_order(&self, mut order: Order) -> Result<(), ServiceError> {
        order.validate()?;
        order.date_created = Utc::now();

        let payload = serde_json::to_vec(&order)?;
        self.publisher.publish(&order.order_uid, payload).await?;

        self.metrics.orders_published.inc();
        tracing::info!(order_uid = %order.order_uid, "order accepted for ingestion");
        Ok(())
    }

    /// Preloads the cache from the store at startup, bounded by cache
    /// capacity, most recent orders first. Failure is logged and the
    /// service starts cold.
    pub async fn warm_cache(&self) {
        match self.store.get_all().await {
            Ok(orders) => {
                let mut loaded = 0usize;
                for order in orders.into_iter().take(self.cache.capacity()) {
                    self.cache.insert(order.order_uid.clone(), order);
                    loaded += 1;
                }
                tracing::info!(loaded, "cache warmed from store");
            }
            Err(error) => {
                tracing::warn!(error = %error, "cache warm-up failed, starting cold");
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
