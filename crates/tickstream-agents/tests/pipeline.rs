//! Producer and consumer wired together through the in-memory broker.
//!
//! The producer publishes a bounded run, the consumer drains it into an
//! in-memory SQLite sink, and the test checks what landed in the table and
//! what the broker considers acknowledged.

use std::sync::Arc;
use std::time::Duration;

use tickstream_agents::test_support::{two_host_topology, FlakySink};
use tickstream_agents::{AgentState, ConsumerAgent, InMemoryBroker, ProducerAgent, RunSummary};
use tickstream_models::{ConsumerConfig, LogContext, ProducerConfig};
use tickstream_sink::{Sink, SqliteSink};
use tokio_util::sync::CancellationToken;

const TOPIC: &str = "stock-market-data";

fn producer_config(count: u64) -> ProducerConfig {
    ProducerConfig {
        topic: TOPIC.to_string(),
        message_count: count,
        sleep_interval_seconds: 0,
        seed: Some(2024),
        ..ProducerConfig::default()
    }
}

fn consumer_config(group: &str) -> ConsumerConfig {
    ConsumerConfig {
        topics: vec![TOPIC.to_string()],
        group_id: group.to_string(),
        poll_timeout_ms: 20,
        retry_backoff_ms: 0,
    }
}

async fn produce(broker: &InMemoryBroker, count: u64) -> RunSummary {
    ProducerAgent::new(producer_config(count), Arc::new(broker.clone()))
        .run(
            &two_host_topology(),
            &LogContext::new("PRODUCER"),
            CancellationToken::new(),
        )
        .await
        .unwrap()
}

async fn consume_until<F>(
    broker: &InMemoryBroker,
    group: &str,
    sink: Arc<dyn Sink>,
    done: F,
) -> RunSummary
where
    F: Fn() -> bool + Send + 'static,
{
    let agent = ConsumerAgent::new(consumer_config(group), Arc::new(broker.clone()), sink);
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
async fn produced_run_lands_in_sqlite_in_order() {
    let broker = InMemoryBroker::new();
    let produced = produce(&broker, 3).await;
    assert_eq!(produced.state, AgentState::Completed);
    let run_id = produced.run_id.unwrap();

    let sink = Arc::new(SqliteSink::open_in_memory().unwrap());
    let watched = sink.clone();
    let consumed = consume_until(&broker, "pipeline", sink.clone(), move || {
        watched.count().unwrap_or(0) >= 3
    })
    .await;

    assert_eq!(consumed.state, AgentState::Stopped);
    assert_eq!(consumed.processed, 3);
    assert_eq!(broker.committed_offset("pipeline", TOPIC), 3);

    let stored = sink.get_by_symbol("AMZN").unwrap();
    let sequences: Vec<u64> = stored.iter().map(|r| r.sequence_number).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert!(stored.iter().all(|r| r.run_id == run_id));
    assert!(stored.iter().all(|r| r.producer_alias == "Producer 1"));
}

#[tokio::test]
async fn sink_failures_are_retried_until_stored() {
    let broker = InMemoryBroker::new();
    produce(&broker, 2).await;

    // The first two stores fail, so record 1 is redelivered twice before
    // anything is acknowledged.
    let flaky = Arc::new(FlakySink::failing_first(2));
    let watched = flaky.clone();
    let summary = consume_until(&broker, "flaky", flaky.clone(), move || {
        watched.stored().len() >= 2
    })
    .await;

    assert_eq!(summary.failed, 2);
    assert_eq!(flaky.attempts(), vec![1, 1, 1, 2]);
    let stored: Vec<u64> = flaky.stored().iter().map(|r| r.sequence_number).collect();
    assert_eq!(stored, vec![1, 2]);
    assert_eq!(broker.committed_offset("flaky", TOPIC), 2);
}

#[tokio::test]
async fn lost_acknowledgement_does_not_duplicate_sqlite_rows() {
    let broker = InMemoryBroker::new();
    let produced = produce(&broker, 2).await;
    broker.fail_acknowledgements(1);

    // Record 1 is stored, its commit is lost, and it comes back. The second
    // store of the same delivery key must leave a single row behind.
    let sink = Arc::new(SqliteSink::open_in_memory().unwrap());
    let watched = broker.clone();
    let summary = consume_until(&broker, "acks", sink.clone(), move || {
        watched.committed_offset("acks", TOPIC) >= 2
    })
    .await;

    assert_eq!(summary.failed, 0);
    assert_eq!(summary.processed, 3);
    assert_eq!(sink.count().unwrap(), 2);
    let run_id = produced.run_id.unwrap();
    assert!(sink.get(run_id, 1).unwrap().is_some());
    assert!(sink.get(run_id, 2).unwrap().is_some());
}

#[tokio::test]
async fn independent_groups_each_see_the_whole_run() {
    let broker = InMemoryBroker::new();
    produce(&broker, 4).await;

    for group in ["group-a", "group-b"] {
        let sink = Arc::new(SqliteSink::open_in_memory().unwrap());
        let watched = sink.clone();
        let summary = consume_until(&broker, group, sink.clone(), move || {
            watched.count().unwrap_or(0) >= 4
        })
        .await;
        assert_eq!(summary.processed, 4);
        assert_eq!(sink.count().unwrap(), 4);
        assert_eq!(broker.committed_offset(group, TOPIC), 4);
    }
}
