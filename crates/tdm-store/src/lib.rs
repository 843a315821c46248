//! `tdm-store` — checkpoint storage backends for the tdm pipeline.
//!
//! | Feature   | Backend        | Layout                                              |
//! |-----------|----------------|-----------------------------------------------------|
//! | *(none)*  | `MemoryStore`  | in-process map; for tests and single-process runs   |
//! | *(none)*  | `CsvStore`     | `<dir>/<table>/<checkpoint>.csv`, typed headers     |
//! | `sqlite`  | `SqliteStore`  | one `pipeline.db`, one SQL table per key            |
//! | `parquet` | `ParquetStore` | `<dir>/<table>/<checkpoint>.parquet`                  |
//!
//! All backends implement [`CheckpointStore`] and address tables by key:
//! `"{table}/{checkpoint}"` for a checkpointed version, `"/{table}"` for the
//! unqualified current one (see [`pipeline_table_key`]).  The checkpoint log
//! itself is stored under [`CHECKPOINT_TABLE_NAME`].

pub mod csv;
pub mod error;
pub mod store;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "parquet")]
pub mod parquet;

#[cfg(test)]
mod tests;

pub use csv::CsvStore;
pub use error::{StoreError, StoreResult};
pub use store::{CHECKPOINT_TABLE_NAME, CheckpointStore, MemoryStore, open_store, pipeline_table_key};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "parquet")]
pub use parquet::ParquetStore;
