use std::sync::Arc;
use std::time::Duration;

use tickstream_models::{LogContext, ProducerConfig, TickRecord, Topology};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::broker::{Broker, Connector, OutboundMessage};
use crate::error::AgentError;
use crate::generator::{GeneratedTick, TickGenerator};
use crate::lifecycle::{AgentState, Lifecycle, RunSummary};

/// How long to wait for in-flight publishes when the run ends.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Publishes a bounded, paced sequence of synthetic ticks to one topic.
pub struct ProducerAgent {
    config: ProducerConfig,
    connector: Arc<dyn Connector>,
}

impl ProducerAgent {
    pub fn new(config: ProducerConfig, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    /// Publish `message_count` records, sleeping `sleep_interval` between them.
    ///
    /// Ends in `Completed` once every record is published, or `Stopped` if
    /// `cancel` fires first. A connection or publish failure ends the run with
    /// an error; records are never skipped.
    pub async fn run(
        &self,
        topology: &Topology,
        ctx: &LogContext,
        cancel: CancellationToken,
    ) -> Result<RunSummary, AgentError> {
        self.run_inner(topology, cancel)
            .instrument(ctx.span().clone())
            .await
    }

    async fn run_inner(
        &self,
        topology: &Topology,
        cancel: CancellationToken,
    ) -> Result<RunSummary, AgentError> {
        let mut lifecycle = Lifecycle::producer();
        let endpoint = topology.bootstrap_server();
        let topic = self.config.topic.as_str();

        let broker = match self.connector.connect(endpoint).await {
            Ok(broker) => broker,
            Err(source) => {
                error!(host = %endpoint, topic, error = %source, "Cannot connect to broker");
                lifecycle.fail();
                return Err(AgentError::Connection {
                    endpoint: endpoint.to_string(),
                    source,
                });
            }
        };

        let run_id = Uuid::new_v4();
        let count = self.config.message_count;
        let interval = self.config.sleep_interval();
        lifecycle.transition(AgentState::Running)?;
        info!(
            host = %endpoint,
            topic,
            alias = %self.config.producer_alias,
            symbol = %self.config.symbol,
            count,
            interval_secs = interval.as_secs(),
            %run_id,
            "Producer started"
        );

        let mut published = 0u64;
        for tick in self.generator().take(count as usize) {
            if cancel.is_cancelled() {
                break;
            }

            let sequence = tick.sequence_number;
            let record = self.label(run_id, tick);
            if let Err(e) = publish(broker.as_ref(), topic, &record).await {
                error!(
                    host = %endpoint,
                    topic,
                    sequence,
                    error = %e,
                    "Publish failed, stopping producer"
                );
                lifecycle.fail();
                return Err(e);
            }
            published += 1;

            if sequence < count && !interval.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }

        if let Err(source) = broker.flush(FLUSH_TIMEOUT).await {
            error!(host = %endpoint, topic, error = %source, "Flush failed");
            lifecycle.fail();
            return Err(AgentError::Publish {
                topic: topic.to_string(),
                sequence: published,
                source,
            });
        }

        let final_state = if published == count {
            AgentState::Completed
        } else {
            warn!(published, count, "Producer stopped before reaching its bound");
            AgentState::Stopped
        };
        lifecycle.transition(final_state)?;
        info!(published, topic, "Producer finished");

        Ok(RunSummary {
            state: final_state,
            processed: published,
            failed: 0,
            run_id: Some(run_id),
        })
    }

    fn generator(&self) -> TickGenerator {
        let generator = match self.config.seed {
            Some(seed) => TickGenerator::seeded(&self.config.symbol, seed),
            None => TickGenerator::new(&self.config.symbol),
        };
        generator.with_initial_price(self.config.initial_price)
    }

    fn label(&self, run_id: Uuid, tick: GeneratedTick) -> TickRecord {
        TickRecord {
            run_id,
            symbol: tick.symbol,
            producer_alias: self.config.producer_alias.clone(),
            sequence_number: tick.sequence_number,
            timestamp: tick.timestamp,
            price: tick.price,
            bid: tick.bid,
            ask: tick.ask,
            volume: tick.volume,
        }
    }
}

async fn publish(broker: &dyn Broker, topic: &str, record: &TickRecord) -> Result<(), AgentError> {
    let payload = record.encode()?;
    let message = OutboundMessage {
        key: record.message_key().to_string(),
        payload,
    };
    let report = broker
        .publish(topic, message)
        .await
        .map_err(|source| AgentError::Publish {
            topic: topic.to_string(),
            sequence: record.sequence_number,
            source,
        })?;
    debug!(
        sequence = record.sequence_number,
        price = %record.price,
        partition = report.partition,
        offset = report.offset,
        "Published tick"
    );
    Ok(())
}
