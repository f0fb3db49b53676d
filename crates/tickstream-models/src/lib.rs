pub mod config;
pub mod context;
pub mod error;
pub mod sink_schema;
pub mod tick;
pub mod topology;

pub use config::{ConsumerConfig, ProducerConfig};
pub use context::LogContext;
pub use error::ConfigurationError;
pub use tick::TickRecord;
pub use topology::{HostEntry, HostRole, Topology};
