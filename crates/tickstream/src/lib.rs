//! tickstream - role-selectable streaming agent
//!
//! One process runs one role against a two-host deployment: a producer that
//! publishes a bounded, paced run of synthetic stock ticks, or a consumer that
//! relays every delivered tick into a sink with at-least-once delivery.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tickstream::agents::InMemoryBroker;
//! use tickstream::models::{LogContext, ProducerConfig, Topology};
//! use tickstream::Role;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = LogContext::driver();
//! let topology = Topology::resolve("config/cluster.json", &ctx)?;
//! let summary = tickstream::run(
//!     Role::Producer(ProducerConfig::default()),
//!     &topology,
//!     Arc::new(InMemoryBroker::new()),
//!     &ctx,
//!     CancellationToken::new(),
//! )
//! .await?;
//! println!("{summary:?}");
//! # Ok(())
//! # }
//! ```

pub use tickstream_agents as agents;
pub use tickstream_models as models;
pub use tickstream_sink as sink;

use std::sync::Arc;

use clap::ValueEnum;
use tickstream_agents::{AgentError, Connector, ConsumerAgent, ProducerAgent, RunSummary};
use tickstream_models::{ConsumerConfig, LogContext, ProducerConfig, Topology};
use tickstream_sink::Sink;
use tokio_util::sync::CancellationToken;

/// The behavior a process runs, chosen once at startup.
pub enum Role {
    Producer(ProducerConfig),
    Consumer {
        config: ConsumerConfig,
        sink: Arc<dyn Sink>,
    },
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Producer(_) => "producer",
            Self::Consumer { .. } => "consumer",
        }
    }
}

/// Broker transport selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BrokerKind {
    /// In-process broker. Messages never leave this process.
    Memory,
    /// Kafka cluster reached through the topology's bootstrap server.
    #[cfg(feature = "kafka")]
    Kafka,
}

impl Default for BrokerKind {
    #[cfg(feature = "kafka")]
    fn default() -> Self {
        Self::Kafka
    }

    #[cfg(not(feature = "kafka"))]
    fn default() -> Self {
        Self::Memory
    }
}

impl BrokerKind {
    pub fn connector(self) -> Arc<dyn Connector> {
        match self {
            Self::Memory => Arc::new(tickstream_agents::InMemoryBroker::new()),
            #[cfg(feature = "kafka")]
            Self::Kafka => Arc::new(tickstream_agents::KafkaConnector::default()),
        }
    }
}

/// Run `role` to its end against the resolved topology.
///
/// The producer returns once its bound is reached; the consumer only returns
/// after `cancel` fires. Either returns early with an error on an
/// unrecoverable connection or publish failure.
pub async fn run(
    role: Role,
    topology: &Topology,
    connector: Arc<dyn Connector>,
    ctx: &LogContext,
    cancel: CancellationToken,
) -> Result<RunSummary, AgentError> {
    tracing::info!(
        parent: ctx.span(),
        role = role.name(),
        bootstrap = %topology.bootstrap_server(),
        sink_host = %topology.sink_host().public,
        "Starting agent"
    );

    match role {
        Role::Producer(config) => {
            ProducerAgent::new(config, connector)
                .run(topology, &ctx.child("PRODUCER"), cancel)
                .await
        }
        Role::Consumer { config, sink } => {
            ConsumerAgent::new(config, connector, sink)
                .run(topology, &ctx.child("CONSUMER"), cancel)
                .await
        }
    }
}
