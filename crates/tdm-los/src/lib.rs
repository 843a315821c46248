//! `tdm-los` — zone systems and level-of-service skims.
//!
//! # Crate layout
//!
//! | Module      | Contents                                                  |
//! |-------------|-----------------------------------------------------------|
//! | [`skims`]   | `SkimDict` (dense TAZ matrices), builder, CSV loader      |
//! | [`zones`]   | `MazTazCrosswalk`, CSV loader                             |
//! | [`network`] | `NetworkLos` (zone system + skims), `SkimView`            |
//! | [`error`]   | `LosError`, `LosResult<T>`                                |

pub mod error;
pub mod network;
pub mod skims;
pub mod zones;

#[cfg(test)]
mod tests;

pub use error::{LosError, LosResult};
pub use network::{NetworkLos, SkimView};
pub use skims::{SkimDict, SkimDictBuilder, load_skims_csv, load_skims_reader};
pub use zones::{MazTazCrosswalk, load_maz_taz_csv, load_maz_taz_reader};
