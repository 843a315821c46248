//! Error types for tdm-store.

use thiserror::Error;

use tdm_core::CoreError;

/// Errors raised while reading or writing checkpointed tables.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key '{0}' not found in checkpoint store")]
    NotFound(String),

    #[error("invalid store key '{0}'")]
    InvalidKey(String),

    #[error("corrupt stored table '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("unknown checkpoint format '{0}'")]
    UnknownFormat(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "parquet")]
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[cfg(feature = "parquet")]
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;
