//! Level-of-service error type.

use thiserror::Error;

use tdm_core::{CoreError, ZoneId};

/// Errors produced by `tdm-los`.
#[derive(Debug, Error)]
pub enum LosError {
    #[error("zone {0} is not in the skim zone set")]
    UnknownZone(ZoneId),

    #[error("MAZ {0} is not in the MAZ→TAZ crosswalk")]
    UnknownMaz(ZoneId),

    #[error("skim '{0}' not found")]
    UnknownSkim(String),

    #[error("skim '{name}' has {got} cells, expected {expected}")]
    ShapeMismatch { name: String, expected: usize, got: usize },

    #[error("MAZ {0} appears twice in the crosswalk")]
    DuplicateMaz(ZoneId),

    #[error("two-zone system requires a MAZ→TAZ crosswalk")]
    MissingCrosswalk,

    #[error("skim file has no skim columns after origin,destination")]
    NoSkims,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type LosResult<T> = Result<T, LosError>;
