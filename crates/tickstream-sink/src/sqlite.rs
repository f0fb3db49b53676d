use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use rust_decimal::Decimal;
use tickstream_models::sink_schema::TICKS_TABLE_DDL;
use tickstream_models::TickRecord;
use uuid::Uuid;

use crate::error::SinkError;
use crate::recent::RecentDeliveries;
use crate::sink::Sink;

const UPSERT_TICK: &str = "INSERT OR REPLACE INTO ticks \
     (run_id, sequence_number, symbol, producer_alias, timestamp, price, bid, ask, volume, stored_at) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";

const SELECT_TICK: &str = "SELECT run_id, sequence_number, symbol, producer_alias, timestamp, price, bid, ask, volume \
     FROM ticks";

/// SQLite-backed sink.
///
/// Opens the database read-write with a WAL journal so other processes can
/// read stored ticks while the consumer writes. Rows are keyed by
/// `(run_id, sequence_number)`, so storing a redelivered record replaces its
/// earlier copy instead of duplicating it.
///
/// `rusqlite::Connection` is not `Sync`, so access goes through a `Mutex`.
pub struct SqliteSink {
    conn: Mutex<Connection>,
    recent: RecentDeliveries,
}

impl SqliteSink {
    /// Open (or create) the sink database at `path`. Enables WAL mode.
    pub fn open(path: &str) -> Result<Self, SinkError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(TICKS_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self::with_connection(conn))
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> Result<Self, SinkError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(TICKS_TABLE_DDL)?;
        Ok(Self::with_connection(conn))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            recent: RecentDeliveries::default(),
        }
    }

    /// Replace the redelivery guard (capacity and TTL).
    pub fn with_recent_deliveries(mut self, recent: RecentDeliveries) -> Self {
        self.recent = recent;
        self
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SinkError> {
        self.conn
            .lock()
            .map_err(|e| SinkError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    /// Write a record without consulting the redelivery guard.
    pub fn upsert(&self, record: &TickRecord) -> Result<(), SinkError> {
        let conn = self.lock()?;
        conn.execute(
            UPSERT_TICK,
            rusqlite::params![
                record.run_id.to_string(),
                record.sequence_number as i64,
                record.symbol,
                record.producer_alias,
                record.timestamp,
                record.price.to_string(),
                record.bid.to_string(),
                record.ask.to_string(),
                record.volume as i64,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    /// Fetch one stored record by its identity.
    pub fn get(&self, run_id: Uuid, sequence_number: u64) -> Result<Option<TickRecord>, SinkError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare_cached(&format!("{SELECT_TICK} WHERE run_id = ?1 AND sequence_number = ?2"))?;
        let result = stmt.query_row(
            rusqlite::params![run_id.to_string(), sequence_number as i64],
            row_to_record,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(SinkError::Sqlite(e)),
        }
    }

    /// All stored records for a symbol, oldest sequence first.
    pub fn get_by_symbol(&self, symbol: &str) -> Result<Vec<TickRecord>, SinkError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "{SELECT_TICK} WHERE symbol = ?1 ORDER BY run_id, sequence_number"
        ))?;
        let rows = stmt
            .query_map(rusqlite::params![symbol], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count all stored records.
    pub fn count(&self) -> Result<usize, SinkError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ticks", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl Sink for SqliteSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn store(&self, record: &TickRecord) -> Result<(), SinkError> {
        let key = record.delivery_key();
        if self.recent.contains(&key).await {
            tracing::debug!(key = %key, "Redelivered tick already stored, skipping write");
            return Ok(());
        }

        self.upsert(record)?;
        self.recent.remember(key).await;
        Ok(())
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<TickRecord> {
    let run_id: String = row.get(0)?;
    let sequence_number: i64 = row.get(1)?;
    let timestamp: DateTime<Utc> = row.get(4)?;
    let volume: i64 = row.get(8)?;

    Ok(TickRecord {
        run_id: Uuid::parse_str(&run_id).map_err(|e| conversion_error(0, e))?,
        sequence_number: sequence_number as u64,
        symbol: row.get(2)?,
        producer_alias: row.get(3)?,
        timestamp,
        price: decimal_column(row, 5)?,
        bid: decimal_column(row, 6)?,
        ask: decimal_column(row, 7)?,
        volume: volume as u64,
    })
}

fn decimal_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(index)?;
    Decimal::from_str(&text).map_err(|e| conversion_error(index, e))
}

fn conversion_error<E>(index: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
}
