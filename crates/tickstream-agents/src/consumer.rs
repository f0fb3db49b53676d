use std::sync::Arc;

use tickstream_models::{ConsumerConfig, LogContext, TickRecord, Topology};
use tickstream_sink::Sink;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::broker::{BrokerError, Connector, InboundMessage, Subscription};
use crate::error::AgentError;
use crate::lifecycle::{AgentState, Lifecycle, RunSummary};

/// What happened to one delivered message.
enum Outcome {
    /// Stored in the sink; safe to acknowledge.
    Forwarded(TickRecord),
    /// Payload is not a tick record. Redelivery cannot fix it.
    Undecodable(serde_json::Error),
    /// The sink refused the record. Left unacknowledged for redelivery.
    Failed(AgentError),
}

/// Subscribes to topics and relays every delivered record to the sink.
///
/// Delivery is at-least-once: a record is acknowledged only after the sink
/// accepted it, so a forward failure leads to redelivery on a later poll.
pub struct ConsumerAgent {
    config: ConsumerConfig,
    connector: Arc<dyn Connector>,
    sink: Arc<dyn Sink>,
}

impl ConsumerAgent {
    pub fn new(config: ConsumerConfig, connector: Arc<dyn Connector>, sink: Arc<dyn Sink>) -> Self {
        Self {
            config,
            connector,
            sink,
        }
    }

    /// Receive and forward until `cancel` fires or the broker connection fails.
    ///
    /// The stop signal is only honored between records: a record that has
    /// been polled always finishes its forward/acknowledge cycle first.
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
        let mut lifecycle = Lifecycle::consumer();
        let endpoint = topology.bootstrap_server();
        let topics = &self.config.topics;

        let connection_error = |lifecycle: &mut Lifecycle, source: BrokerError| {
            lifecycle.fail();
            AgentError::Connection {
                endpoint: endpoint.to_string(),
                source,
            }
        };

        let broker = match self.connector.connect(endpoint).await {
            Ok(broker) => broker,
            Err(source) => {
                error!(host = %endpoint, ?topics, error = %source, "Cannot connect to broker");
                return Err(connection_error(&mut lifecycle, source));
            }
        };
        let mut subscription = match broker.subscribe(topics, &self.config.group_id).await {
            Ok(subscription) => subscription,
            Err(source) => {
                error!(host = %endpoint, ?topics, error = %source, "Cannot subscribe");
                return Err(connection_error(&mut lifecycle, source));
            }
        };

        lifecycle.transition(AgentState::Running)?;
        info!(
            host = %endpoint,
            ?topics,
            group = %self.config.group_id,
            sink = self.sink.name(),
            sink_host = %topology.sink_host().public,
            "Consumer subscribed"
        );

        let mut forwarded = 0u64;
        let mut failed = 0u64;

        loop {
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                polled = subscription.poll(self.config.poll_timeout()) => polled,
            };

            let message = match polled {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(source) => {
                    error!(host = %endpoint, ?topics, error = %source, "Poll failed");
                    close(subscription.as_mut()).await;
                    return Err(connection_error(&mut lifecycle, source));
                }
            };

            match self.forward(&message).await {
                Outcome::Forwarded(record) => {
                    acknowledge(subscription.as_mut(), &message, &record.delivery_key()).await;
                    forwarded += 1;
                }
                Outcome::Undecodable(e) => {
                    error!(
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        error = %e,
                        "Dropping undecodable message"
                    );
                    acknowledge(subscription.as_mut(), &message, "undecodable").await;
                }
                Outcome::Failed(e) => {
                    failed += 1;
                    warn!(
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        error = %e,
                        "Forward failed, record left for redelivery"
                    );
                    let backoff = self.config.retry_backoff();
                    if backoff.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                }
            }
        }

        close(subscription.as_mut()).await;
        lifecycle.transition(AgentState::Stopped)?;
        info!(forwarded, failed, "Consumer stopped");

        Ok(RunSummary {
            state: AgentState::Stopped,
            processed: forwarded,
            failed,
            run_id: None,
        })
    }

    async fn forward(&self, message: &InboundMessage) -> Outcome {
        let record = match TickRecord::decode(&message.payload) {
            Ok(record) => record,
            Err(e) => return Outcome::Undecodable(e),
        };

        match self.sink.store(&record).await {
            Ok(()) => {
                debug!(
                    topic = %message.topic,
                    offset = message.offset,
                    producer = %record.producer_alias,
                    sequence = record.sequence_number,
                    "Forwarded tick"
                );
                Outcome::Forwarded(record)
            }
            Err(source) => Outcome::Failed(AgentError::Forward {
                topic: message.topic.clone(),
                key: record.delivery_key(),
                source,
            }),
        }
    }
}

/// Commit a processed message. A failed commit only means redelivery.
async fn acknowledge(subscription: &mut dyn Subscription, message: &InboundMessage, key: &str) {
    if let Err(e) = subscription.acknowledge(message).await {
        warn!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            key,
            error = %e,
            "Acknowledge failed, record will be redelivered"
        );
    }
}

async fn close(subscription: &mut dyn Subscription) {
    if let Err(e) = subscription.close().await {
        warn!(error = %e, "Failed to release subscription");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::broker::{Broker, InMemoryBroker, OutboundMessage};
    use crate::test_support::{sample_record, two_host_topology, FlakySink, RecordingSink};

    const TOPIC: &str = "stock-market-data";
    const GROUP: &str = "test-group";

    fn config() -> ConsumerConfig {
        ConsumerConfig {
            topics: vec![TOPIC.to_string()],
            group_id: GROUP.to_string(),
            poll_timeout_ms: 20,
            retry_backoff_ms: 0,
        }
    }

    async fn publish_records(broker: &InMemoryBroker, sequences: &[u64]) -> Vec<TickRecord> {
        let mut records = Vec::new();
        for &seq in sequences {
            let record = sample_record(seq);
            broker
                .publish(
                    TOPIC,
                    OutboundMessage {
                        key: record.symbol.clone(),
                        payload: record.encode().unwrap(),
                    },
                )
                .await
                .unwrap();
            records.push(record);
        }
        records
    }

    /// Run the consumer until `done` says the sink has seen enough, then stop it.
    async fn run_until<F>(agent: ConsumerAgent, done: F) -> RunSummary
    where
        F: Fn() -> bool + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            while !done() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            trigger.cancel();
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            agent.run(&two_host_topology(), &LogContext::new("CONSUMER"), cancel),
        )
        .await
        .expect("consumer did not stop in time")
        .unwrap()
    }

    #[tokio::test]
    async fn forwards_in_delivery_order_and_acknowledges() {
        let broker = InMemoryBroker::new();
        let published = publish_records(&broker, &[1, 2, 3]).await;
        let sink = Arc::new(RecordingSink::default());

        let agent = ConsumerAgent::new(config(), Arc::new(broker.clone()), sink.clone());
        let watched = sink.clone();
        let summary = run_until(agent, move || watched.len() >= 3).await;

        assert_eq!(summary.state, AgentState::Stopped);
        assert_eq!(summary.processed, 3);
        assert_eq!(sink.records(), published);
        assert_eq!(broker.committed_offset(GROUP, TOPIC), 3);
    }

    #[tokio::test]
    async fn failed_forward_is_not_acknowledged_and_is_redelivered() {
        let broker = InMemoryBroker::new();
        publish_records(&broker, &[1, 2]).await;
        let sink = Arc::new(FlakySink::failing_first(1));

        let agent = ConsumerAgent::new(config(), Arc::new(broker.clone()), sink.clone());
        let watched = sink.clone();
        let summary = run_until(agent, move || watched.stored().len() >= 2).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 2);
        // Record 1 was attempted twice: once failing, once after redelivery.
        assert_eq!(sink.attempts(), vec![1, 1, 2]);
        let stored: Vec<u64> = sink.stored().iter().map(|r| r.sequence_number).collect();
        assert_eq!(stored, vec![1, 2]);
        assert_eq!(broker.committed_offset(GROUP, TOPIC), 2);
    }

    #[tokio::test]
    async fn sink_outage_leaves_offset_uncommitted() {
        let broker = InMemoryBroker::new();
        publish_records(&broker, &[1]).await;
        let sink = Arc::new(FlakySink::failing_first(u64::MAX));

        let agent = ConsumerAgent::new(config(), Arc::new(broker.clone()), sink.clone());
        let watched = sink.clone();
        let summary = run_until(agent, move || watched.attempts().len() >= 3).await;

        assert_eq!(summary.processed, 0);
        assert!(summary.failed >= 3);
        assert!(sink.attempts().iter().all(|&seq| seq == 1));
        assert_eq!(broker.committed_offset(GROUP, TOPIC), 0);
    }

    #[tokio::test]
    async fn undecodable_payload_is_skipped() {
        let broker = InMemoryBroker::new();
        broker
            .publish(
                TOPIC,
                OutboundMessage {
                    key: "AMZN".to_string(),
                    payload: b"not a tick".to_vec(),
                },
            )
            .await
            .unwrap();
        publish_records(&broker, &[1]).await;
        let sink = Arc::new(RecordingSink::default());

        let agent = ConsumerAgent::new(config(), Arc::new(broker.clone()), sink.clone());
        let watched = sink.clone();
        run_until(agent, move || watched.len() >= 1).await;

        assert_eq!(sink.len(), 1);
        assert_eq!(broker.committed_offset(GROUP, TOPIC), 2);
    }

    #[tokio::test]
    async fn receives_records_published_after_subscribing() {
        let broker = InMemoryBroker::new();
        let sink = Arc::new(RecordingSink::default());
        let agent = ConsumerAgent::new(config(), Arc::new(broker.clone()), sink.clone());

        let late = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            publish_records(&late, &[1, 2]).await;
        });

        let watched = sink.clone();
        let summary = run_until(agent, move || watched.len() >= 2).await;
        assert_eq!(summary.processed, 2);
    }

    #[tokio::test]
    async fn stop_signal_on_idle_topic_stops_cleanly() {
        let broker = InMemoryBroker::new();
        let agent = ConsumerAgent::new(
            config(),
            Arc::new(broker.clone()),
            Arc::new(RecordingSink::default()),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = agent
            .run(&two_host_topology(), &LogContext::new("CONSUMER"), cancel)
            .await
            .unwrap();
        assert_eq!(summary.state, AgentState::Stopped);
        assert_eq!(summary.processed, 0);
    }

    #[tokio::test]
    async fn unreachable_broker_fails_the_run() {
        let broker = InMemoryBroker::new();
        broker.refuse_connections();
        let agent = ConsumerAgent::new(
            config(),
            Arc::new(broker.clone()),
            Arc::new(RecordingSink::default()),
        );

        let err = agent
            .run(&two_host_topology(), &LogContext::new("CONSUMER"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Connection { .. }));
        assert_eq!(broker.connections(), vec!["1.2.3.4"]);
    }

    #[tokio::test]
    async fn empty_topic_list_fails_the_run() {
        let broker = InMemoryBroker::new();
        let mut cfg = config();
        cfg.topics.clear();
        let agent = ConsumerAgent::new(
            cfg,
            Arc::new(broker),
            Arc::new(RecordingSink::default()),
        );

        let err = agent
            .run(&two_host_topology(), &LogContext::new("CONSUMER"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Connection { .. }));
    }
}
