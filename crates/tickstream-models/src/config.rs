use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TOPIC: &str = "stock-market-data";
pub const DEFAULT_PRODUCER_ALIAS: &str = "Producer 1";
pub const DEFAULT_SYMBOL: &str = "AMZN";
pub const DEFAULT_GROUP_ID: &str = "tickstream-consumer";

/// Parameters of one producer run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProducerConfig {
    /// Topic every record is published to.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Friendly name attached to each record.
    #[serde(default = "default_alias")]
    pub producer_alias: String,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Pause between two consecutive publishes, in seconds.
    #[serde(default = "default_sleep_interval")]
    pub sleep_interval_seconds: u64,
    /// Number of records to publish before completing.
    #[serde(default = "default_message_count")]
    pub message_count: u64,
    /// Starting price of the synthetic random walk.
    #[serde(default = "default_initial_price")]
    pub initial_price: f64,
    /// Fixes the generator's random stream when set.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl ProducerConfig {
    pub fn sleep_interval(&self) -> Duration {
        Duration::from_secs(self.sleep_interval_seconds)
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            producer_alias: default_alias(),
            symbol: default_symbol(),
            sleep_interval_seconds: default_sleep_interval(),
            message_count: default_message_count(),
            initial_price: default_initial_price(),
            seed: None,
        }
    }
}

/// Parameters of one consumer run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumerConfig {
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
    /// Consumer group the subscription commits offsets under.
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Upper bound on a single poll before the stop signal is re-checked.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,
    /// Pause after a failed forward before polling for the redelivery.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl ConsumerConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            topics: default_topics(),
            group_id: default_group_id(),
            poll_timeout_ms: default_poll_timeout(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}
fn default_alias() -> String {
    DEFAULT_PRODUCER_ALIAS.to_string()
}
fn default_symbol() -> String {
    DEFAULT_SYMBOL.to_string()
}
fn default_sleep_interval() -> u64 {
    1
}
fn default_message_count() -> u64 {
    100
}
fn default_initial_price() -> f64 {
    100.0
}
fn default_topics() -> Vec<String> {
    vec![DEFAULT_TOPIC.to_string()]
}
fn default_group_id() -> String {
    DEFAULT_GROUP_ID.to_string()
}
fn default_poll_timeout() -> u64 {
    500
}
fn default_retry_backoff() -> u64 {
    1000
}
