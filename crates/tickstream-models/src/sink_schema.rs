/// Table the sink stores forwarded ticks in.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS ticks (
///     run_id           TEXT NOT NULL,
///     sequence_number  INTEGER NOT NULL,
///     symbol           TEXT NOT NULL,
///     producer_alias   TEXT NOT NULL,
///     timestamp        TEXT NOT NULL,
///     price            TEXT NOT NULL,
///     bid              TEXT NOT NULL,
///     ask              TEXT NOT NULL,
///     volume           INTEGER NOT NULL,
///     stored_at        TEXT NOT NULL,
///     PRIMARY KEY (run_id, sequence_number)
/// );
/// ```
///
/// The primary key makes a redelivered record overwrite its earlier copy.
pub const TICKS_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS ticks (
    run_id           TEXT NOT NULL,
    sequence_number  INTEGER NOT NULL,
    symbol           TEXT NOT NULL,
    producer_alias   TEXT NOT NULL,
    timestamp        TEXT NOT NULL,
    price            TEXT NOT NULL,
    bid              TEXT NOT NULL,
    ask              TEXT NOT NULL,
    volume           INTEGER NOT NULL,
    stored_at        TEXT NOT NULL,
    PRIMARY KEY (run_id, sequence_number)
);
CREATE INDEX IF NOT EXISTS idx_ticks_symbol ON ticks(symbol);
CREATE INDEX IF NOT EXISTS idx_ticks_timestamp ON ticks(timestamp);
";
