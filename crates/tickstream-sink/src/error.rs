use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Sink not available: {0}")]
    Unavailable(String),
}
