use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error not covered by a more specific variant.
    #[error("Database error: {0}")]
    Sqlite(rusqlite::Error),

    /// The database is locked, busy, or could not be opened. Retryable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A scoped lookup found no row for this user.
    #[error("Record not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The operation does not apply to this record kind.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored payload column did not hold a JSON object.
    #[error("Corrupt payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),
}

impl StoreError {
    /// Whether the caller may retry the same operation after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, msg) = &err {
            let detail = msg.clone().unwrap_or_else(|| code.to_string());
            match code.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure => return StoreError::Unavailable(detail),
                ErrorCode::ConstraintViolation => return StoreError::Conflict(detail),
                _ => {}
            }
        }
        match err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::Sqlite(other),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
