//! Broker boundary.
//!
//! Agents depend only on these traits. A `Connector` turns the topology's
//! bootstrap address into a live `Broker`; a `Broker` publishes and opens
//! subscriptions; a `Subscription` polls and acknowledges.
//!
//! Redelivery contract: a message returned by `poll` that is never passed to
//! `acknowledge` is returned again by a later `poll` on the same
//! subscription.

pub mod memory;

#[cfg(feature = "kafka")]
pub mod kafka;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryBroker;

#[cfg(feature = "kafka")]
pub use kafka::KafkaConnector;

/// Port appended to bootstrap addresses that do not name one.
pub const DEFAULT_BROKER_PORT: u16 = 9092;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("broker rejected message: {0}")]
    Rejected(String),

    #[error("subscription closed")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

/// A record ready to be sent: broker key plus encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub key: String,
    pub payload: Vec<u8>,
}

/// Where the broker placed a published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// A message handed out by `Subscription::poll`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

/// Opens broker connections from a bootstrap address.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, bootstrap_server: &str) -> Result<Arc<dyn Broker>, BrokerError>;
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        message: OutboundMessage,
    ) -> Result<DeliveryReport, BrokerError>;

    async fn subscribe(
        &self,
        topics: &[String],
        group_id: &str,
    ) -> Result<Box<dyn Subscription>, BrokerError>;

    /// Wait for in-flight publishes to be delivered.
    async fn flush(&self, timeout: Duration) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait Subscription: Send {
    /// Next deliverable message, or `None` if nothing arrived within `timeout`.
    ///
    /// Dropping the returned future before it completes must not lose a
    /// message.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>, BrokerError>;

    /// Commit consumption of `message` for the subscription's group.
    async fn acknowledge(&mut self, message: &InboundMessage) -> Result<(), BrokerError>;

    /// Leave the group and release the subscription.
    async fn close(&mut self) -> Result<(), BrokerError>;
}

/// `host` or `host:port` as given in the topology, normalised to `host:port`.
pub fn bootstrap_endpoint(address: &str) -> String {
    let address = address.trim();
    if address.rsplit_once(':').is_some_and(|(_, port)| port.parse::<u16>().is_ok()) {
        address.to_string()
    } else {
        format!("{address}:{DEFAULT_BROKER_PORT}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_default_port() {
        assert_eq!(bootstrap_endpoint("1.2.3.4"), "1.2.3.4:9092");
        assert_eq!(bootstrap_endpoint("kafka.internal"), "kafka.internal:9092");
    }

    #[test]
    fn explicit_port_is_kept() {
        assert_eq!(bootstrap_endpoint("1.2.3.4:19092"), "1.2.3.4:19092");
        assert_eq!(bootstrap_endpoint(" broker:9093 "), "broker:9093");
    }
}
