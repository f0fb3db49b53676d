use async_trait::async_trait;
use tickstream_models::TickRecord;

use crate::error::SinkError;
use crate::sink::Sink;

/// Sink that only logs what it receives. Used for dry runs.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl Sink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn store(&self, record: &TickRecord) -> Result<(), SinkError> {
        tracing::info!(
            symbol = %record.symbol,
            producer = %record.producer_alias,
            sequence = record.sequence_number,
            price = %record.price,
            volume = record.volume,
            "Tick received"
        );
        Ok(())
    }
}
