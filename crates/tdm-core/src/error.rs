//! Core error type.
//!
//! Higher crates wrap `CoreError` as one `#[from]` variant of their own enum.

use thiserror::Error;

/// Errors raised by tables, channel RNG, and configuration loading.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("column '{column}' not found in table indexed by '{index}'")]
    ColumnNotFound { column: String, index: String },

    #[error("column '{column}' has {got} rows, table has {expected}")]
    LengthMismatch { column: String, expected: usize, got: usize },

    #[error("column '{column}' is {found}, expected {expected}")]
    TypeMismatch { column: String, expected: &'static str, found: &'static str },

    #[error("index '{index}' contains duplicate value {value}")]
    DuplicateIndex { index: String, value: i64 },

    #[error("cannot append rows: {count} index values already present (first: {first})")]
    OverlappingIndex { count: usize, first: i64 },

    #[error("cannot append columns: indexes differ")]
    IndexMismatch,

    #[error("random channel '{0}' is not registered")]
    UnknownChannel(String),

    #[error("id {id} is not in the domain of random channel '{channel}'")]
    UnknownRow { channel: String, id: i64 },

    #[error("random channel '{channel}' already contains id {id}")]
    ChannelOverlap { channel: String, id: i64 },

    #[error("random draws requested outside of a step")]
    NoActiveStep,

    #[error("step '{0}' is still active")]
    StepActive(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("settings file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand result type for `tdm-core`.
pub type CoreResult<T> = Result<T, CoreError>;
