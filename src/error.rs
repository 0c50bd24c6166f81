use thiserror::Error;

/// Custom error type for series operations.
#[derive(Error, Debug)]
pub enum SeriesError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("No archive with resolution {0}")]
    NoMatchingArchive(i64),

    #[error("Cannot read rollups from the base archive")]
    RollupsFromBase,

    #[error("Lock acquisition failed: {0}")]
    Lock(String),
}

// Implement conversion from lock poison errors for convenience
impl<T> From<std::sync::PoisonError<T>> for SeriesError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        SeriesError::Lock(format!("Mutex poisoned: {}", err))
    }
}
