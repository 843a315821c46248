//! `tdm-tour-od` — joint tour origin-destination choice.
//!
//! Each tour picks an (origin, destination) pair in three stages per
//! segment:
//!
//! 1. **Sample.** OD alternatives are the cross product of filtered land use
//!    origins with destinations that have a positive size term.  With a
//!    two-zone system and presampling enabled, the sample is drawn at
//!    (origin MAZ, destination TAZ) level and a destination MAZ is then
//!    chosen inside each sampled TAZ.
//! 2. **Logsums.** Every sampled pair gets a tour mode choice logsum,
//!    optionally fed by trip mode choice logsums on pseudo trips.
//! 3. **Simulate.** One pair is chosen per tour from its sample.
//!
//! # Crate layout
//!
//! | Module           | Contents                                                  |
//! |------------------|-----------------------------------------------------------|
//! | [`settings`]     | `TourOdSettings`, `LogsumSettings`, `OriginScheme`        |
//! | [`size_terms`]   | size term CSV, `SizeTermCalculator`, `aggregate_size_terms` |
//! | [`od_id`]        | `OdId` and `"{origin}_{destination}"` helpers             |
//! | [`alternatives`] | `create_od_alts`, origin filtering                        |
//! | [`sample`]       | `OdSampler`, `choose_maz_for_taz`, `run_od_sample`        |
//! | [`logsums`]      | `LogsumModels`, `run_od_logsums`                          |
//! | [`simulate`]     | `OdSimulator`                                             |
//! | [`tour_od`]      | `run_tour_od`, the `TourOdChoice` step                    |
//! | [`error`]        | `OdError`, `OdResult<T>`                                  |
//!
//! # Feature flags
//!
//! | Flag       | Effect                                              |
//! |------------|-----------------------------------------------------|
//! | `parallel` | Per-chooser utility evaluation on Rayon.            |
//! | `fx-hash`  | FxHash index maps.                                  |

pub mod alternatives;
pub mod error;
pub mod logsums;
pub mod od_id;
pub mod sample;
pub mod settings;
pub mod simulate;
pub mod size_terms;
pub mod tour_od;

#[cfg(test)]
mod tests;

pub use alternatives::{OdColumns, create_od_alts, filter_origins};
pub use error::{OdError, OdResult};
pub use logsums::{LogsumModels, TOUR_MODE_CHOICE_LOGSUM, TRIPS_TABLE, run_od_logsums};
pub use od_id::{OdId, make_od_ids, od_id_col, split_od_ids};
pub use sample::{DEST_MAZ, ORIG_MAZ, ORIG_TAZ, OdSampler, choose_maz_for_taz, run_od_sample};
pub use settings::{LogsumSettings, OriginScheme, TourOdSettings, TripModeChoiceSettings};
pub use simulate::OdSimulator;
pub use size_terms::{
    DEST_TAZ, MazSizeTerms, SIZE_TERM, SizeTermCalculator, SizeTermCoefficients, aggregate_size_terms,
    load_size_terms_csv, load_size_terms_reader,
};
pub use tour_od::{TOURS_CHANNEL, TourOdChoice, TourOdModel, TourOdOptions, run_tour_od};
