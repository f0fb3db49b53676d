use thiserror::Error;
use tickstream_models::ConfigurationError;
use tickstream_sink::SinkError;

use crate::broker::BrokerError;
use crate::lifecycle::AgentState;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Cannot reach broker at {endpoint}: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: BrokerError,
    },

    #[error("Failed to publish record {sequence} to topic {topic}: {source}")]
    Publish {
        topic: String,
        sequence: u64,
        #[source]
        source: BrokerError,
    },

    #[error("Failed to forward record {key} from topic {topic} to sink: {source}")]
    Forward {
        topic: String,
        key: String,
        #[source]
        source: SinkError,
    },

    #[error("Record encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid lifecycle transition {from:?} -> {to:?}")]
    InvalidTransition { from: AgentState, to: AgentState },
}
