use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

use super::{
    Broker, BrokerError, Connector, DeliveryReport, InboundMessage, OutboundMessage, Subscription,
};

/// In-process broker with Kafka-like semantics.
///
/// Each topic is a single append-only partition. Committed offsets are kept
/// per `(group, topic)`, so a new subscription in an existing group resumes
/// where the previous one acknowledged. New groups start from the earliest
/// message. Cloning shares the same broker.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    appended: watch::Sender<u64>,
    refuse_connections: AtomicBool,
}

#[derive(Default)]
struct State {
    topics: HashMap<String, Vec<StoredMessage>>,
    committed: HashMap<(String, String), i64>,
    connections: Vec<String>,
    /// Publishes still allowed to succeed. `None` means unlimited.
    publish_budget: Option<u64>,
    /// Acknowledgements to reject before commits go through again.
    failing_acks: u64,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    key: String,
    payload: Vec<u8>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                appended,
                refuse_connections: AtomicBool::new(false),
            }),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, BrokerError> {
        self.inner
            .state
            .lock()
            .map_err(|e| BrokerError::Transport(format!("broker state poisoned: {e}")))
    }

    /// Make every later `connect` fail as if the host were down.
    pub fn refuse_connections(&self) {
        self.inner.refuse_connections.store(true, Ordering::SeqCst);
    }

    /// Let `count` more publishes succeed, then reject the rest.
    pub fn fail_publishes_after(&self, count: u64) {
        if let Ok(mut state) = self.state() {
            state.publish_budget = Some(count);
        }
    }

    /// Reject the next `count` acknowledgements without committing them.
    pub fn fail_acknowledgements(&self, count: u64) {
        if let Ok(mut state) = self.state() {
            state.failing_acks = count;
        }
    }

    /// Bootstrap addresses `connect` has been called with, in order.
    pub fn connections(&self) -> Vec<String> {
        self.state()
            .map(|state| state.connections.clone())
            .unwrap_or_default()
    }

    /// Every message currently stored on `topic`, as a consumer would see it.
    pub fn messages(&self, topic: &str) -> Vec<InboundMessage> {
        let Ok(state) = self.state() else {
            return Vec::new();
        };
        state
            .topics
            .get(topic)
            .map(|log| {
                log.iter()
                    .enumerate()
                    .map(|(offset, stored)| to_inbound(topic, offset as i64, stored))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Next offset `group` will read from `topic`.
    pub fn committed_offset(&self, group_id: &str, topic: &str) -> i64 {
        self.state()
            .ok()
            .and_then(|state| {
                state
                    .committed
                    .get(&(group_id.to_string(), topic.to_string()))
                    .copied()
            })
            .unwrap_or(0)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

fn to_inbound(topic: &str, offset: i64, stored: &StoredMessage) -> InboundMessage {
    InboundMessage {
        topic: topic.to_string(),
        partition: 0,
        offset,
        key: Some(stored.key.clone()),
        payload: stored.payload.clone(),
    }
}

#[async_trait]
impl Connector for InMemoryBroker {
    async fn connect(&self, bootstrap_server: &str) -> Result<Arc<dyn Broker>, BrokerError> {
        self.state()?.connections.push(bootstrap_server.to_string());
        if self.inner.refuse_connections.load(Ordering::SeqCst) {
            return Err(BrokerError::Unreachable(format!(
                "connection to {bootstrap_server} refused"
            )));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(
        &self,
        topic: &str,
        message: OutboundMessage,
    ) -> Result<DeliveryReport, BrokerError> {
        let offset = {
            let mut state = self.state()?;
            if let Some(budget) = state.publish_budget.as_mut() {
                if *budget == 0 {
                    return Err(BrokerError::Rejected(format!(
                        "topic {topic} is not accepting writes"
                    )));
                }
                *budget -= 1;
            }
            let log = state.topics.entry(topic.to_string()).or_default();
            log.push(StoredMessage {
                key: message.key,
                payload: message.payload,
            });
            (log.len() - 1) as i64
        };

        self.inner.appended.send_modify(|count| *count += 1);

        Ok(DeliveryReport {
            topic: topic.to_string(),
            partition: 0,
            offset,
        })
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
        Ok(Box::new(MemorySubscription {
            broker: self.clone(),
            topics: topics.to_vec(),
            group_id: group_id.to_string(),
            appended: self.inner.appended.subscribe(),
            next_topic: 0,
            closed: false,
        }))
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), BrokerError> {
        Ok(())
    }
}

struct MemorySubscription {
    broker: InMemoryBroker,
    topics: Vec<String>,
    group_id: String,
    appended: watch::Receiver<u64>,
    /// Topic to look at first on the next poll, so one busy topic cannot
    /// starve the others.
    next_topic: usize,
    closed: bool,
}

impl MemorySubscription {
    /// First message at a committed offset across the subscribed topics.
    fn next_available(&mut self) -> Result<Option<InboundMessage>, BrokerError> {
        let state = self.broker.state()?;
        let count = self.topics.len();
        for step in 0..count {
            let index = (self.next_topic + step) % count;
            let topic = &self.topics[index];
            let committed = state
                .committed
                .get(&(self.group_id.clone(), topic.clone()))
                .copied()
                .unwrap_or(0);
            let stored = state
                .topics
                .get(topic)
                .and_then(|log| log.get(committed as usize));
            if let Some(stored) = stored {
                let message = to_inbound(topic, committed, stored);
                self.next_topic = (index + 1) % count;
                return Ok(Some(message));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>, BrokerError> {
        if self.closed {
            return Err(BrokerError::Closed);
        }

        let deadline = Instant::now() + timeout;
        loop {
            // Mark the current version seen before looking, so an append that
            // races with the check still wakes `changed()`.
            self.appended.borrow_and_update();
            if let Some(message) = self.next_available()? {
                return Ok(Some(message));
            }

            match tokio::time::timeout_at(deadline, self.appended.changed()).await {
                Err(_) => return Ok(None),
                Ok(Err(_)) => return Err(BrokerError::Closed),
                Ok(Ok(())) => {}
            }
        }
    }

    async fn acknowledge(&mut self, message: &InboundMessage) -> Result<(), BrokerError> {
        if self.closed {
            return Err(BrokerError::Closed);
        }
        let mut state = self.broker.state()?;
        if state.failing_acks > 0 {
            state.failing_acks -= 1;
            return Err(BrokerError::Transport(format!(
                "commit of {}@{} lost",
                message.topic, message.offset
            )));
        }
        let committed = state
            .committed
            .entry((self.group_id.clone(), message.topic.clone()))
            .or_insert(0);
        *committed = (*committed).max(message.offset + 1);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.closed = true;
        Ok(())
    }
}
