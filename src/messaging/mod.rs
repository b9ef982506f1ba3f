use async_trait::async_trait;
use rdkafka::types::RDKafkaErrorCode;

mod kafka;
pub use kafka::{ensure_topic, KafkaPublisher, KafkaSource};

#[cfg(test)]
pub mod mock;

// ============================================================================
// Stream Seams
// ============================================================================
//
// The pipeline never touches rdkafka types directly. The consumer loop is
// generic over `StreamSource` and the write path over `StreamPublisher`, so
// both run against in-memory doubles in tests while the Kafka-backed
// implementations live in `kafka.rs`.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("topic {topic} provisioning failed: {code}")]
    Admin { topic: String, code: RDKafkaErrorCode },

    #[error("stream unavailable: {0}")]
    Unavailable(String),
}

/// One message fetched from the stream, detached from the underlying client
/// so it can outlive the fetch call.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Consuming side of the stream: fetch, acknowledge, release.
///
/// `commit` acknowledges a single message; callers only invoke it after the
/// message's effects are durable, which is what gives the pipeline its
/// at-least-once semantics.
#[async_trait]
pub trait StreamSource: Send {
    async fn fetch_next(&mut self) -> Result<StreamMessage, StreamError>;

    async fn commit(&mut self, message: &StreamMessage) -> Result<(), StreamError>;

    /// Releases the stream resources. Called on every consumer exit path.
    fn close(&mut self);
}

/// Producing side of the stream. The topic is fixed at construction; the
/// key should be the order_uid for partition affinity.
#[async_trait]
pub trait StreamPublisher: Send + Sync {
    async fn publish(&self, key: &str, payload: Vec<u8>) -> Result<(), StreamError>;
}
