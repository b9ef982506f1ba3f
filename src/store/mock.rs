use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{OrderStore, StoreError};
use crate::models::Order;

// ============================================================================
// In-Memory Store Double
// ============================================================================
//
// Upsert semantics match the Postgres implementation: saving the same
// order_uid twice leaves a single record, which is what makes the
// at-least-once pipeline converge. Call counters let tests assert how often
// the pipeline actually reached the store.
//
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    orders: Mutex<HashMap<String, Order>>,
    saves: AtomicUsize,
    fetches: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `save` fail, simulating a store outage.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn contains(&self, order_uid: &str) -> bool {
        self.orders.lock().contains_key(order_uid)
    }

    pub fn stored_len(&self) -> usize {
        self.orders.lock().len()
    }

    pub fn insert_existing(&self, order: Order) {
        self.orders.lock().insert(order.order_uid.clone(), order);
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.orders
            .lock()
            .insert(order.order_uid.clone(), order.clone());
        Ok(())
    }

    async fn get_by_id(&self, order_uid: &str) -> Result<Order, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.orders
            .lock()
            .get(order_uid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))
    }

    async fn get_all(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self.orders.lock().values().cloned().collect();
        orders.sort_by(|a, b| b.date_created.cmp(&a.date_created));
        Ok(orders)
    }
}
