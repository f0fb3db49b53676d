//! Test doubles shared by unit and integration tests.
//!
//! `RecordingSink` keeps every record it is handed. `FlakySink` fails a fixed
//! number of store calls before it starts accepting, which is how redelivery
//! is exercised without a real database.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use tickstream_models::{HostEntry, TickRecord, Topology};
use tickstream_sink::{Sink, SinkError};
use uuid::Uuid;

/// Run id stamped on every `sample_record`.
pub const SAMPLE_RUN_ID: Uuid = Uuid::from_u128(0x7f3a_9c21_0000_4000_8000_0000_0000_0001);

/// `[1.2.3.4, 5.6.7.8]`: broker on the first host, sink on the second.
pub fn two_host_topology() -> Topology {
    Topology::from_hosts(vec![
        HostEntry::new("1.2.3.4", "10.0.0.4"),
        HostEntry::new("5.6.7.8", "10.0.0.8"),
    ])
    .expect("two hosts always resolve")
}

/// A fixed AMZN tick from "Producer 1" with the given sequence number.
pub fn sample_record(sequence_number: u64) -> TickRecord {
    let cents = 18_000 + sequence_number as i64;
    TickRecord {
        run_id: SAMPLE_RUN_ID,
        symbol: "AMZN".to_string(),
        producer_alias: "Producer 1".to_string(),
        sequence_number,
        timestamp: Utc
            .with_ymd_and_hms(2024, 3, 1, 14, 30, 0)
            .single()
            .expect("valid timestamp")
            + chrono::Duration::seconds(sequence_number as i64),
        price: Decimal::new(cents, 2),
        bid: Decimal::new(cents - 9, 2),
        ask: Decimal::new(cents + 9, 2),
        volume: 100 * sequence_number,
    }
}

/// Sink that accepts everything and remembers it in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<TickRecord>>,
}

impl RecordingSink {
    pub fn len(&self) -> usize {
        self.records.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<TickRecord> {
        self.records.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn store(&self, record: &TickRecord) -> Result<(), SinkError> {
        self.records
            .lock()
            .expect("lock poisoned")
            .push(record.clone());
        Ok(())
    }
}

/// Sink that rejects the first `n` store calls as unavailable.
#[derive(Debug)]
pub struct FlakySink {
    failures_left: Mutex<u64>,
    attempts: Mutex<Vec<u64>>,
    stored: Mutex<Vec<TickRecord>>,
}

impl FlakySink {
    pub fn failing_first(n: u64) -> Self {
        Self {
            failures_left: Mutex::new(n),
            attempts: Mutex::new(Vec::new()),
            stored: Mutex::new(Vec::new()),
        }
    }

    /// Sequence numbers of every store call, successful or not.
    pub fn attempts(&self) -> Vec<u64> {
        self.attempts.lock().expect("lock poisoned").clone()
    }

    pub fn stored(&self) -> Vec<TickRecord> {
        self.stored.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl Sink for FlakySink {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn store(&self, record: &TickRecord) -> Result<(), SinkError> {
        self.attempts
            .lock()
            .expect("lock poisoned")
            .push(record.sequence_number);

        {
            let mut left = self.failures_left.lock().expect("lock poisoned");
            if *left > 0 {
                *left -= 1;
                return Err(SinkError::Unavailable("simulated outage".to_string()));
            }
        }

        self.stored
            .lock()
            .expect("lock poisoned")
            .push(record.clone());
        Ok(())
    }
}
