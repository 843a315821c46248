//! OD choice error type.

use thiserror::Error;

use tdm_choice::ChoiceError;
use tdm_core::CoreError;
use tdm_los::LosError;
use tdm_state::StateError;

/// Errors produced by `tdm-tour-od`.
#[derive(Debug, Error)]
pub enum OdError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("'{0}' is not an origin_destination id")]
    BadOdId(String),

    #[error("no size term coefficients for selector '{selector}', segment '{segment}'")]
    UnknownSegment { selector: String, segment: String },

    #[error("land use has no column '{0}' named by the size term coefficients")]
    UnknownLandUseColumn(String),

    #[error("zone {zone} has negative size term {size} for segment '{segment}'")]
    NegativeSizeTerm { segment: String, zone: i64, size: f64 },

    #[error("TAZ {0} has no MAZ with a size term")]
    EmptyTaz(i64),

    #[error("chooser {chooser} has {got} TAZ draws, expected {expected}")]
    SampleShape { chooser: i64, expected: usize, got: usize },

    #[error("MAZ choice for chooser {chooser} landed on a padding slot (TAZ {taz})")]
    PaddingSelected { chooser: i64, taz: i64 },

    #[error("table '{table}' has no row {id}")]
    MissingRow { table: String, id: i64 },

    #[error("{what} has no row for zone {zone}")]
    MissingZone { what: &'static str, zone: i64 },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Los(#[from] LosError),

    #[error(transparent)]
    Choice(#[from] ChoiceError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type OdResult<T> = Result<T, OdError>;
