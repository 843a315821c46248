//! Model settings for `tour_od_choice` and its mode-choice logsums.
//!
//! # `tour_od_choice.toml`
//!
//! ```toml
//! SAMPLE_SPEC        = "tour_od_choice_sample.csv"
//! SPEC               = "tour_od_choice.csv"
//! COEFFICIENTS       = "tour_od_choice_coefficients.csv"
//! SAMPLE_SIZE        = 30
//! SIZE_TERM_SELECTOR = "tour_od"
//! SEGMENTS           = ["work", "school"]
//! ORIG_FILTER        = "original_MAZ > 0"
//! LOGSUM_SETTINGS    = "tour_mode_choice"
//! DEST_CHOICE_SAMPLE_TABLE_NAME = "tour_od_choice_sample"
//!
//! [CONSTANTS]
//! max_dist = 80.0
//! ```
//!
//! Column-name keys (`ORIG_COL_NAME`, `DEST_COL_NAME`, …) have defaults;
//! see [`TourOdSettings`].

use serde::Deserialize;

use tdm_choice::Constants;

use crate::{OdError, OdResult};

fn origin() -> String {
    "origin".into()
}

fn destination() -> String {
    "destination".into()
}

fn tour_type() -> String {
    "tour_type".into()
}

fn od_choice() -> String {
    "od_choice".into()
}

fn tour_mode_choice() -> String {
    "tour_mode_choice".into()
}

/// `tour_od_choice.toml`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TourOdSettings {
    /// Sampling spec: one coefficient column per segment.
    pub sample_spec:                    String,
    /// Final simulation spec: one coefficient column per segment.
    pub spec:                           String,
    #[serde(default)]
    pub coefficients:                   Option<String>,
    pub sample_size:                    usize,
    /// Size term coefficient file (`model_selector,segment,<land use columns>`).
    #[serde(default = "size_terms_file")]
    pub size_terms:                     String,
    pub size_term_selector:             String,
    pub segments:                       Vec<String>,
    #[serde(default = "tour_type")]
    pub chooser_segment_column_name:    String,
    #[serde(default = "origin")]
    pub orig_col_name:                  String,
    #[serde(default = "destination")]
    pub dest_col_name:                  String,
    /// Alternative id column carried into the saved sample table.
    #[serde(default = "destination")]
    pub alt_dest_col_name:              String,
    #[serde(default = "od_choice")]
    pub dest_choice_column_name:        String,
    #[serde(default)]
    pub dest_choice_logsum_column_name: Option<String>,
    #[serde(default)]
    pub dest_choice_sample_table_name:  Option<String>,
    /// Land use expression selecting candidate origins.
    pub orig_filter:                    String,
    #[serde(default)]
    pub origin_attr_cols_to_use:        Vec<String>,
    /// Chooser columns kept for sampling and simulation; empty keeps all.
    #[serde(default)]
    pub simulate_chooser_columns:       Vec<String>,
    #[serde(default = "tour_mode_choice")]
    pub logsum_settings:                String,
    #[serde(default)]
    pub constants:                      Constants,
}

fn size_terms_file() -> String {
    "destination_choice_size_terms.csv".into()
}

impl TourOdSettings {
    pub fn from_toml_str(s: &str) -> OdResult<Self> {
        toml::from_str(s).map_err(|e| OdError::Config(e.to_string()))
    }

    /// Where sampled origins come from and how they map back.
    pub fn origin_scheme(&self) -> OdResult<OriginScheme> {
        OriginScheme::parse(&self.orig_filter)
    }
}

/// `tour_mode_choice.toml`: the logsum model evaluated for every sampled
/// OD pair.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LogsumSettings {
    pub spec:                              String,
    #[serde(default)]
    pub coefficients:                      Option<String>,
    #[serde(default)]
    pub constants:                         Constants,
    /// Tour columns merged onto the sample before evaluating; empty keeps all.
    #[serde(default)]
    pub logsum_chooser_columns:            Vec<String>,
    #[serde(default)]
    pub compute_trip_mode_choice_logsums:  bool,
    /// Trip mode choice model run on the pseudo trips.
    #[serde(default)]
    pub trip_mode_choice:                  Option<TripModeChoiceSettings>,
}

/// Spec and coefficients of the trip mode choice model.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TripModeChoiceSettings {
    pub spec:         String,
    #[serde(default)]
    pub coefficients: Option<String>,
    #[serde(default)]
    pub constants:    Constants,
}

// ── Origin schemes ────────────────────────────────────────────────────────────

/// How candidate origins are identified in land use.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OriginScheme {
    /// `original_MAZ > 0`: sampled origins are final.
    OriginalMaz,
    /// `external_TAZ > 0`: origins are sampled as internal MAZs and
    /// remapped through the land use `external_MAZ` column.
    ExternalTaz,
}

impl OriginScheme {
    pub const EXTERNAL_MAZ_COLUMN: &'static str = "external_MAZ";

    pub fn parse(filter: &str) -> OdResult<Self> {
        let normalized: String = filter.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.as_str() {
            "original_MAZ > 0" => Ok(OriginScheme::OriginalMaz),
            "external_TAZ > 0" => Ok(OriginScheme::ExternalTaz),
            other => Err(OdError::Config(format!(
                "ORIG_FILTER '{other}' does not identify tour origins; use 'original_MAZ > 0' or 'external_TAZ > 0'"
            ))),
        }
    }
}
