use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// One order per stream message, JSON on the wire. The aggregate is persisted
// and cached as a single unit keyed by `order_uid`; the embedded delivery,
// payment and item records never travel alone.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    #[serde(default)]
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    #[serde(default)]
    pub shardkey: String,
    #[serde(default)]
    pub sm_id: i64,
    #[serde(default = "Utc::now")]
    pub date_created: DateTime<Utc>,
    #[serde(default)]
    pub oof_shard: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub zip: String,
    pub city: String,
    pub address: String,
    #[serde(default)]
    pub region: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Payment {
    pub transaction: String,
    #[serde(default)]
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    #[serde(default)]
    pub custom_fee: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i64,
    #[serde(default)]
    pub size: Option<String>,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
}

impl Order {
    /// Checks the fields the write path requires before an order is allowed
    /// onto the stream. The consumer trusts that this ran upstream.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.order_uid.is_empty() {
            return Err(ValidationError::MissingField("order_uid"));
        }
        if self.track_number.is_empty() {
            return Err(ValidationError::MissingField("track_number"));
        }
        if self.customer_id.is_empty() {
            return Err(ValidationError::MissingField("customer_id"));
        }
        if self.delivery.name.is_empty() {
            return Err(ValidationError::MissingField("delivery.name"));
        }
        if self.payment.transaction.is_empty() {
            return Err(ValidationError::MissingField("payment.transaction"));
        }
        Ok(())
    }
}

// ============================================================================
// Test Fixtures
// ============================================================================


// ============================================================================
// Unit Tests
// ============================================================================
