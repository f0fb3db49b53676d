//! Kafka transport built on rdkafka.
//!
//! Publishing goes through a `FutureProducer`. Subscriptions use a
//! `StreamConsumer` with auto-commit disabled: acknowledging a message commits
//! `offset + 1` for its partition, and a message that was polled but never
//! acknowledged is re-read by seeking back to it before the next poll.
//! Seeks and commits block inside librdkafka, so they run on the blocking
//! pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};

use super::{
    bootstrap_endpoint, Broker, BrokerError, Connector, DeliveryReport, InboundMessage,
    OutboundMessage, Subscription,
};

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens Kafka connections.
#[derive(Debug, Clone)]
pub struct KafkaConnector {
    /// Upper bound on a single publish, including broker acknowledgement.
    pub message_timeout: Duration,
}

impl Default for KafkaConnector {
    fn default() -> Self {
        Self {
            message_timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl Connector for KafkaConnector {
    async fn connect(&self, bootstrap_server: &str) -> Result<Arc<dyn Broker>, BrokerError> {
        let bootstrap = bootstrap_endpoint(bootstrap_server);
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &bootstrap)
            .set(
                "message.timeout.ms",
                self.message_timeout.as_millis().to_string(),
            )
            .create()
            .map_err(|e| BrokerError::Unreachable(e.to_string()))?;

        // librdkafka connects lazily; fetch metadata so an unreachable
        // broker fails here instead of on the first publish.
        let probe = producer.clone();
        tokio::task::spawn_blocking(move || {
            probe
                .client()
                .fetch_metadata(None, METADATA_TIMEOUT)
                .map(|_| ())
        })
        .await
        .map_err(|e| BrokerError::Unreachable(e.to_string()))?
        .map_err(|e| BrokerError::Unreachable(format!("{bootstrap}: {e}")))?;

        tracing::debug!(bootstrap = %bootstrap, "Connected to Kafka");
        Ok(Arc::new(KafkaBroker {
            bootstrap,
            producer,
            message_timeout: self.message_timeout,
        }))
    }
}

struct KafkaBroker {
    bootstrap: String,
    producer: FutureProducer,
    message_timeout: Duration,
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn publish(
        &self,
        topic: &str,
        message: OutboundMessage,
    ) -> Result<DeliveryReport, BrokerError> {
        let record = FutureRecord::to(topic)
            .key(message.key.as_str())
            .payload(message.payload.as_slice());

        match self
            .producer
            .send(record, Timeout::After(self.message_timeout))
            .await
        {
            Ok((partition, offset)) => Ok(DeliveryReport {
                topic: topic.to_string(),
                partition,
                offset,
            }),
            Err((e, _)) => Err(BrokerError::Rejected(e.to_string())),
        }
    }

    async fn subscribe(
        &self,
        topics: &[String],
        group_id: &str,
    ) -> Result<Box<dyn Subscription>, BrokerError> {
        if topics.is_empty() {
            return Err(BrokerError::Rejected(
                "subscription needs at least one topic".to_string(),
            ));
        }

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.bootstrap)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| BrokerError::Unreachable(e.to_string()))?;

        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&names)
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        Ok(Box::new(KafkaSubscription {
            consumer: Arc::new(consumer),
            pending: None,
        }))
    }

    async fn flush(&self, timeout: Duration) -> Result<(), BrokerError> {
        self.producer
            .flush(Timeout::After(timeout))
            .map_err(|e| BrokerError::Transport(e.to_string()))
    }
}

/// Position of the last polled message that has not been acknowledged.
#[derive(Debug, Clone)]
struct Position {
    topic: String,
    partition: i32,
    offset: i64,
}

struct KafkaSubscription {
    consumer: Arc<StreamConsumer>,
    pending: Option<Position>,
}

#[async_trait]
impl Subscription for KafkaSubscription {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>, BrokerError> {
        if let Some(position) = self.pending.take() {
            let consumer = Arc::clone(&self.consumer);
            blocking(move || {
                consumer.seek(
                    &position.topic,
                    position.partition,
                    Offset::Offset(position.offset),
                    SEEK_TIMEOUT,
                )
            })
            .await?;
        }

        let received = match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => return Ok(None),
            Ok(Err(e)) => return Err(BrokerError::Transport(e.to_string())),
            Ok(Ok(message)) => InboundMessage {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message
                    .key()
                    .map(|key| String::from_utf8_lossy(key).into_owned()),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            },
        };

        self.pending = Some(Position {
            topic: received.topic.clone(),
            partition: received.partition,
            offset: received.offset,
        });
        Ok(Some(received))
    }

    async fn acknowledge(&mut self, message: &InboundMessage) -> Result<(), BrokerError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|e| BrokerError::Transport(e.to_string()))?;
        let consumer = Arc::clone(&self.consumer);
        blocking(move || consumer.commit(&offsets, CommitMode::Sync)).await?;

        let acknowledged = self.pending.as_ref().is_some_and(|p| {
            p.topic == message.topic && p.partition == message.partition && p.offset == message.offset
        });
        if acknowledged {
            self.pending = None;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.consumer.unsubscribe();
        Ok(())
    }
}

/// Run a blocking librdkafka call off the async worker threads.
async fn blocking<F>(call: F) -> Result<(), BrokerError>
where
    F: FnOnce() -> KafkaResult<()> + Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| BrokerError::Transport(e.to_string()))?
        .map_err(|e| BrokerError::Transport(e.to_string()))
}
