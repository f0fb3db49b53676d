use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One synthetic market event as published to the broker.
///
/// Built by the producer agent from a generated tick and never mutated
/// afterwards. The JSON encoding of this struct is the wire payload; the
/// message key is the symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickRecord {
    /// Identifies the producer instance that emitted the record.
    pub run_id: Uuid,
    pub symbol: String,
    pub producer_alias: String,
    /// Starts at 1 for every producer run.
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub volume: u64,
}

impl TickRecord {
    /// Stable identity across redeliveries of the same record.
    pub fn delivery_key(&self) -> String {
        format!("{}:{}", self.run_id, self.sequence_number)
    }

    /// Broker message key.
    pub fn message_key(&self) -> &str {
        &self.symbol
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> TickRecord {
        TickRecord {
            run_id: Uuid::nil(),
            symbol: "AMZN".to_string(),
            producer_alias: "Producer 1".to_string(),
            sequence_number: 7,
            timestamp: Utc::now(),
            price: dec!(181.25),
            bid: dec!(181.16),
            ask: dec!(181.34),
            volume: 1200,
        }
    }

    #[test]
    fn delivery_key_combines_run_and_sequence() {
        let record = sample();
        assert_eq!(
            record.delivery_key(),
            "00000000-0000-0000-0000-000000000000:7"
        );
        assert_eq!(record.message_key(), "AMZN");
    }

    #[test]
    fn wire_payload_carries_every_field() {
        let record = sample();
        let value: serde_json::Value = serde_json::from_slice(&record.encode().unwrap()).unwrap();
        let obj = value.as_object().unwrap();
        for field in [
            "run_id",
            "symbol",
            "producer_alias",
            "sequence_number",
            "timestamp",
            "price",
            "bid",
            "ask",
            "volume",
        ] {
            assert!(obj.contains_key(field), "missing field {field}");
        }
        // Prices travel as strings to keep exact decimals.
        assert_eq!(obj["price"], serde_json::json!("181.25"));
    }

    #[test]
    fn decode_rejects_payload_with_missing_fields() {
        let err = TickRecord::decode(br#"{"symbol": "AMZN", "sequence_number": 1}"#);
        assert!(err.is_err());
    }

    #[test]
    fn decode_accepts_encoded_record() {
        let record = sample();
        let decoded = TickRecord::decode(&record.encode().unwrap()).unwrap();
        assert_eq!(decoded, record);
    }
}
