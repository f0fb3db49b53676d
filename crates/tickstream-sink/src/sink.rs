use std::sync::Arc;

use async_trait::async_trait;
use tickstream_models::TickRecord;

use crate::error::SinkError;

/// Downstream persistent store the consumer agent forwards records to.
///
/// `store` returning `Ok` is the only confirmation the consumer relies on
/// before acknowledging a record to the broker. Implementations must accept
/// the same record more than once, since unacknowledged records are
/// redelivered.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    async fn store(&self, record: &TickRecord) -> Result<(), SinkError>;
}

#[async_trait]
impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn store(&self, record: &TickRecord) -> Result<(), SinkError> {
        (**self).store(record).await
    }
}
