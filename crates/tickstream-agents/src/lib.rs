pub mod broker;
pub mod consumer;
pub mod error;
pub mod generator;
pub mod lifecycle;
pub mod producer;

pub mod test_support;

pub use broker::{
    Broker, BrokerError, Connector, DeliveryReport, InMemoryBroker, InboundMessage,
    OutboundMessage, Subscription,
};
pub use consumer::ConsumerAgent;
pub use error::AgentError;
pub use generator::{GeneratedTick, RandomWalk, TickGenerator};
pub use lifecycle::{AgentState, Lifecycle, RunSummary};
pub use producer::ProducerAgent;

#[cfg(feature = "kafka")]
pub use broker::KafkaConnector;
