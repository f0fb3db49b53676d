pub mod error;
pub mod log_sink;
pub mod recent;
pub mod sink;
pub mod sqlite;

pub use error::SinkError;
pub use log_sink::LogSink;
pub use recent::RecentDeliveries;
pub use sink::Sink;
pub use sqlite::SqliteSink;
