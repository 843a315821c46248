//! The `CheckpointStore` trait, key helpers, and the in-memory backend.

use std::collections::BTreeMap;
use std::path::Path;

use tdm_core::Table;

use crate::{CsvStore, StoreError, StoreResult};

/// Key under which the checkpoint log is stored.
pub const CHECKPOINT_TABLE_NAME: &str = "checkpoints";

/// Storage key for `table`: `"{table}/{checkpoint}"`, or `"/{table}"` when no
/// checkpoint is given.
pub fn pipeline_table_key(table: &str, checkpoint: Option<&str>) -> String {
    match checkpoint {
        Some(cp) => format!("{table}/{cp}"),
        None     => format!("/{table}"),
    }
}

/// Reject keys that could escape a store directory.
pub(crate) fn validate_key(key: &str) -> StoreResult<()> {
    let trimmed = key.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
        return Err(StoreError::InvalidKey(key.to_owned()));
    }
    Ok(())
}

/// Append-only table storage addressed by string key.
///
/// Writing a key that already exists replaces it; the checkpoint manager
/// never does so except for the checkpoint log.
pub trait CheckpointStore {
    fn write_table(&mut self, key: &str, table: &Table) -> StoreResult<()>;

    /// Read a stored table.  Missing keys are [`StoreError::NotFound`].
    fn read_table(&self, key: &str) -> StoreResult<Table>;

    fn contains(&self, key: &str) -> bool;

    /// Flush and close.  Idempotent.
    fn close(&mut self) -> StoreResult<()>;
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for Box<S> {
    fn write_table(&mut self, key: &str, table: &Table) -> StoreResult<()> {
        (**self).write_table(key, table)
    }

    fn read_table(&self, key: &str) -> StoreResult<Table> {
        (**self).read_table(key)
    }

    fn contains(&self, key: &str) -> bool {
        (**self).contains(key)
    }

    fn close(&mut self) -> StoreResult<()> {
        (**self).close()
    }
}

// ── MemoryStore ───────────────────────────────────────────────────────────────

/// Keeps every stored table in a map.  Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, Table>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

impl CheckpointStore for MemoryStore {
    fn write_table(&mut self, key: &str, table: &Table) -> StoreResult<()> {
        validate_key(key)?;
        self.tables.insert(key.to_owned(), table.clone());
        Ok(())
    }

    fn read_table(&self, key: &str) -> StoreResult<Table> {
        self.tables.get(key).cloned().ok_or_else(|| StoreError::NotFound(key.to_owned()))
    }

    fn contains(&self, key: &str) -> bool {
        self.tables.contains_key(key)
    }

    fn close(&mut self) -> StoreResult<()> {
        Ok(())
    }
}

// ── Factory ───────────────────────────────────────────────────────────────────

/// Open a store by format name (`checkpoint_format` setting) at `path`.
///
/// Backends behind disabled features report [`StoreError::UnknownFormat`].
pub fn open_store(format: &str, path: &Path) -> StoreResult<Box<dyn CheckpointStore>> {
    match format {
        "memory" => Ok(Box::new(MemoryStore::new())),
        "csv"    => Ok(Box::new(CsvStore::new(path)?)),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Box::new(crate::SqliteStore::new(path)?)),
        #[cfg(feature = "parquet")]
        "parquet" => Ok(Box::new(crate::ParquetStore::new(path)?)),
        other    => Err(StoreError::UnknownFormat(other.to_owned())),
    }
}
