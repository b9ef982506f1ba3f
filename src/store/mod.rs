use async_trait::async_trait;

use crate::models::Order;

mod postgres;
pub use postgres::PostgresOrderStore;

#[cfg(test)]
pub mod mock;

// ============================================================================
// Durable Store - system of record for order aggregates
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("order {0} not found")]
    NotFound(String),

    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence seam the pipeline talks to. The consumer and the lookup
/// service only ever see this trait, which keeps them testable against an
/// in-memory double.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Idempotent upsert keyed by `order_uid`. The consumer relies on this
    /// to make at-least-once redelivery converge.
    async fn save(&self, order: &Order) -> Result<(), StoreError>;

    /// Fails with [`StoreError::NotFound`] when no record exists.
    async fn get_by_id(&self, order_uid: &str) -> Result<Order, StoreError>;

    /// Used only for startup cache warm-up, most recent orders first.
    async fn get_all(&self) -> Result<Vec<Order>, StoreError>;
}
