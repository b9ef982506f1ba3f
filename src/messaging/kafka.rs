use std::time::Duration;

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{Message, Offset, TopicPartitionList};

use super::{StreamError, StreamMessage, StreamPublisher, StreamSource};

// ============================================================================
// Kafka-backed stream clients
// ============================================================================

/// Manual-commit consumer over a single topic. Auto-commit is disabled so
/// the offset only moves when the pipeline explicitly acknowledges a
/// message after persistence.
pub struct KafkaSource {
    consumer: StreamConsumer,
}

impl KafkaSource {
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Result<Self, StreamError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .create()?;

        consumer.subscribe(&[topic])?;

        tracing::info!(brokers, group_id, topic, "kafka consumer subscribed");
        Ok(Self { consumer })
    }
}

#[async_trait]
impl StreamSource for KafkaSource {
    async fn fetch_next(&mut self) -> Result<StreamMessage, StreamError> {
        let message = self.consumer.recv().await?;
        Ok(StreamMessage {
            key: message
                .key()
                .map(|key| String::from_utf8_lossy(key).into_owned()),
            payload: message.payload().unwrap_or_default().to_vec(),
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
        })
    }

    async fn commit(&mut self, message: &StreamMessage) -> Result<(), StreamError> {
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )?;
        self.consumer.commit(&offsets, CommitMode::Async)?;
        Ok(())
    }

    fn close(&mut self) {
        self.consumer.unsubscribe();
        tracing::info!("kafka consumer unsubscribed");
    }
}

/// Producer bound to the ingestion topic.
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaPublisher {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, StreamError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl StreamPublisher for KafkaPublisher {
    async fn publish(&self, key: &str, payload: Vec<u8>) -> Result<(), StreamError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(&payload);

        self.producer
            .send(record, Timeout::After(Duration::from_secs(5)))
            .await
            .map_err(|(error, _)| StreamError::Kafka(error))?;

        tracing::debug!(topic = %self.topic, key, "published order to stream");
        Ok(())
    }
}

/// Creates the topic when it does not exist yet; an already-existing topic
/// is not an error.
pub async fn ensure_topic(
    brokers: &str,
    topic: &str,
    partitions: i32,
) -> Result<(), StreamError> {
    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .create()?;

    let new_topic = NewTopic::new(topic, partitions, TopicReplication::Fixed(1));
    let results = admin
        .create_topics(&[new_topic], &AdminOptions::new())
        .await?;

    for result in results {
        match result {
            Ok(name) => tracing::info!(topic = %name, "topic created"),
            Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                tracing::debug!(topic = %name, "topic already exists");
            }
            Err((name, code)) => {
                return Err(StreamError::Admin { topic: name, code });
            }
        }
    }
    Ok(())
}
