//! Checkpoint manager: an append-only log of `{checkpoint → table pointers}`.
//!
//! A pointer is the checkpoint name under which a table's current version
//! was written.  An empty pointer means the table was dropped as of that
//! checkpoint.  The log itself is stored as the `checkpoints` table:
//!
//! | checkpoint_name | land_use | tours           |
//! |-----------------|----------|-----------------|
//! | init            | init     |                 |
//! | initialize_tours| init     | initialize_tours|
//! | tour_od_choice  | init     | tour_od_choice  |

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{info, warn};

use tdm_core::{Column, CoreError, Table};
use tdm_store::{CHECKPOINT_TABLE_NAME, CheckpointStore, pipeline_table_key};

use crate::context::downcast;
use crate::{State, StateError, StateResult};

/// Sentinel checkpoint name meaning "the last checkpoint".
pub const LAST_CHECKPOINT: &str = "_";

const CHECKPOINT_NAME: &str = "checkpoint_name";

/// One entry of the checkpoint log.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Checkpoint {
    pub name:   String,
    /// Table → pointer, including empty (dropped) pointers.
    pub tables: BTreeMap<String, String>,
}

/// The checkpoint log plus the pointer map of the current run.
#[derive(Clone, Debug, Default)]
pub struct Checkpoints {
    log:  Vec<Checkpoint>,
    last: BTreeMap<String, String>,
}

impl Checkpoints {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.log.iter().map(|c| c.name.as_str())
    }

    pub fn last_checkpoint_name(&self) -> Option<&str> {
        self.log.last().map(|c| c.name.as_str())
    }

    pub fn find(&self, name: &str) -> Option<&Checkpoint> {
        self.log.iter().find(|c| c.name == name)
    }

    /// Pointer in the current run; `Some("")` for dropped tables.
    pub fn pointer(&self, table: &str) -> Option<&str> {
        self.last.get(table).map(String::as_str)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.last.keys().map(String::as_str)
    }

    pub(crate) fn mark_dropped(&mut self, table: &str) {
        if let Some(p) = self.last.get_mut(table) {
            p.clear();
        }
    }

    /// Log as a table: one row per checkpoint, one string column per table.
    pub fn to_table(&self) -> StateResult<Table> {
        let tables: BTreeSet<&str> = self.log.iter().flat_map(|c| c.tables.keys().map(String::as_str)).collect();
        let mut out = Table::new("", (0..self.log.len() as i64).collect())
            .with_column(CHECKPOINT_NAME, self.log.iter().map(|c| c.name.clone()).collect::<Vec<_>>())?;
        for t in tables {
            let col: Vec<String> = self.log.iter().map(|c| c.tables.get(t).cloned().unwrap_or_default()).collect();
            out.set_column(t, col)?;
        }
        Ok(out)
    }

    /// Rebuild from a stored log table.
    ///
    /// Empty cells are absent tables until the table has appeared in an
    /// earlier row; after that they are dropped markers.
    pub fn from_table(table: &Table) -> StateResult<Self> {
        let names = table.strs(CHECKPOINT_NAME)?;
        let mut log: Vec<Checkpoint> = names
            .iter()
            .map(|n| Checkpoint { name: n.clone(), tables: BTreeMap::new() })
            .collect();
        for (col_name, col) in table.columns() {
            if col_name == CHECKPOINT_NAME {
                continue;
            }
            let Column::Str(pointers) = col else {
                return Err(CoreError::TypeMismatch {
                    column:   col_name.to_owned(),
                    expected: "str",
                    found:    col.dtype().as_str(),
                }
                .into());
            };
            let mut seen = false;
            for (entry, p) in log.iter_mut().zip(pointers) {
                seen |= !p.is_empty();
                if seen {
                    entry.tables.insert(col_name.to_owned(), p.clone());
                }
            }
        }
        let last = log.last().map(|c| c.tables.clone()).unwrap_or_default();
        Ok(Self { log, last })
    }
}

impl State {
    /// Write every salient table under `"{table}/{name}"`, record the
    /// pointers, and persist the log.
    pub fn add_checkpoint(&mut self, name: &str) -> StateResult<()> {
        let store = self.store.as_mut().ok_or(StateError::NoStore)?;

        let salient: Vec<String> = self
            .table_status
            .iter()
            .filter(|(_, s)| **s)
            .map(|(n, _)| n.clone())
            .collect();
        for table_name in &salient {
            let Some(value) = self.context.get(table_name) else {
                warn!(table = %table_name, "salient table missing from context; not checkpointed");
                continue;
            };
            let table: Arc<Table> = downcast(table_name, Arc::clone(value))?;
            store.write_table(&pipeline_table_key(table_name, Some(name)), &table)?;
            self.table_status.insert(table_name.clone(), false);
            self.checkpoints.last.insert(table_name.clone(), name.to_owned());
        }

        self.checkpoints.log.push(Checkpoint { name: name.to_owned(), tables: self.checkpoints.last.clone() });
        store.write_table(CHECKPOINT_TABLE_NAME, &self.checkpoints.to_table()?)?;
        info!(checkpoint = name, written = salient.len(), "checkpoint added");
        Ok(())
    }

    /// Replace the current run with the one stored in `store`, as of
    /// checkpoint `name` (`"_"` for the last).
    ///
    /// The log is truncated after `name`; restored tables are not salient and
    /// their random channels are registered again.
    pub fn restore_from(&mut self, store: Box<dyn CheckpointStore>, name: &str) -> StateResult<()> {
        let mut checkpoints = Checkpoints::from_table(&store.read_table(CHECKPOINT_TABLE_NAME)?)?;
        let pos = if name == LAST_CHECKPOINT {
            checkpoints.log.len().checked_sub(1)
        } else {
            checkpoints.log.iter().position(|c| c.name == name)
        }
        .ok_or_else(|| StateError::CheckpointNotFound(name.to_owned()))?;
        checkpoints.log.truncate(pos + 1);
        checkpoints.last = checkpoints.log[pos].tables.clone();

        for existing in std::mem::take(&mut self.table_status).into_keys() {
            self.context.remove(&existing);
            self.invalidate(&existing);
        }

        for (table_name, pointer) in &checkpoints.last {
            if pointer.is_empty() {
                continue;
            }
            let table = store.read_table(&pipeline_table_key(table_name, Some(pointer)))?;
            if self.registry.is_channel_table(table_name) {
                self.rng.drop_channel(table_name);
                self.rng.add_channel(table_name, table.index())?;
            }
            self.add_table(table_name, table, Some(false));
        }

        let restored = checkpoints.log[pos].name.clone();
        self.checkpoints = checkpoints;
        self.store = Some(store);
        info!(checkpoint = %restored, "restored from checkpoint");
        Ok(())
    }

    /// [`restore_from`](Self::restore_from) using the open store.
    pub fn restore(&mut self, name: &str) -> StateResult<()> {
        let store = self.store.take().ok_or(StateError::NoStore)?;
        self.restore_from(store, name)
    }

    pub fn checkpoint_names(&self) -> Vec<String> {
        self.checkpoints.names().map(str::to_owned).collect()
    }

    pub fn last_checkpoint_name(&self) -> Option<&str> {
        self.checkpoints.last_checkpoint_name()
    }

    pub fn checkpoints(&self) -> &Checkpoints {
        &self.checkpoints
    }
}
