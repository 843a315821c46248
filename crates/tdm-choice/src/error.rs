//! Choice-model error type.

use thiserror::Error;

use tdm_core::CoreError;
use tdm_los::LosError;

/// Errors produced by `tdm-choice`.
#[derive(Debug, Error)]
pub enum ChoiceError {
    #[error("cannot parse expression '{expr}': {reason}")]
    Parse { expr: String, reason: String },

    #[error("expression '{expr}' refers to unknown name '{name}'")]
    UnknownName { expr: String, name: String },

    #[error("spec has no coefficient column '{0}'")]
    UnknownSpecColumn(String),

    #[error("coefficient '{0}' is not defined")]
    UnknownCoefficient(String),

    #[error("choosers index '{0}' is not monotonic increasing")]
    NotMonotonic(String),

    #[error("no alternatives to choose from")]
    NoAlternatives,

    #[error("chooser {chooser} has no alternatives in the sample")]
    MissingAlternatives { chooser: i64 },

    #[error("sample rows for chooser {chooser} are not contiguous")]
    NonContiguousAlternatives { chooser: i64 },

    #[error("chooser {chooser} has no alternative with positive probability")]
    NoAvailableAlternatives { chooser: i64 },

    #[error("utility for chooser {chooser} is NaN")]
    InvalidUtility { chooser: i64 },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Los(#[from] LosError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type ChoiceResult<T> = Result<T, ChoiceError>;
