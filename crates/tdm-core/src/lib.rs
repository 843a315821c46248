//! `tdm-core` — foundational types for the `tdm` travel demand pipeline.
//!
//! Every other `tdm-*` crate depends on this one.  It has no `tdm-*`
//! dependencies of its own.
//!
//! # What lives here
//!
//! | Module         | Contents                                                |
//! |----------------|---------------------------------------------------------|
//! | [`ids`]        | `ZoneId`                                                |
//! | [`table`]      | `Table`, `Column`, `DType`, `Value`                     |
//! | [`rng`]        | `Random` (per-entity channel streams), `Draws`          |
//! | [`config`]     | `Settings`, `FileSystem`, `NetworkSettings`             |
//! | [`error`]      | `CoreError`, `CoreResult`                               |
//!
//! # Feature flags
//!
//! | Flag      | Effect                                                  |
//! |-----------|---------------------------------------------------------|
//! | `fx-hash` | Use FxHash for [`IdMap`] (index lookups, channel rows). |

pub mod config;
pub mod error;
pub mod ids;
pub mod rng;
pub mod table;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use config::{CheckpointPolicy, FileSystem, NetworkSettings, Settings, ZoneSystem};
pub use error::{CoreError, CoreResult};
pub use ids::ZoneId;
pub use rng::{Draws, Random};
pub use table::{Column, DType, Table, Value};

/// Hash map keyed by integer ids.
#[cfg(feature = "fx-hash")]
pub type IdMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// Hash map keyed by integer ids.
#[cfg(not(feature = "fx-hash"))]
pub type IdMap<K, V> = std::collections::HashMap<K, V>;
