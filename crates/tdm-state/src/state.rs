//! The pipeline [`State`]: context store, table registry, and typed
//! configuration for one model run.
//!
//! # Context operations
//!
//! | Method        | Absent key                                           |
//! |---------------|------------------------------------------------------|
//! | [`get`]       | object loader, then table loader, else `Access` error |
//! | [`get_or`]    | as `get`, falling back to the default                |
//! | [`access`]    | stores and returns the initial value                 |
//! | [`set`]       | n/a; drops every predicated key afterwards           |
//! | [`drop`]      | no-op; otherwise drops predicated keys as well        |
//!
//! Loader results returned by `get` are not cached.  Tables become cached
//! only through [`add_table`](State::add_table) or
//! [`get_dataframe`](State::get_dataframe).
//!
//! [`get`]: State::get
//! [`get_or`]: State::get_or
//! [`access`]: State::access
//! [`set`]: State::set
//! [`drop`]: State::drop

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, warn};

use tdm_core::{FileSystem, NetworkSettings, Random, Settings, Table};
use tdm_store::CheckpointStore;

use crate::checkpoint::{Checkpoints, LAST_CHECKPOINT};
use crate::context::{Context, ContextValue, downcast};
use crate::{Registry, StateError, StateResult};

/// Direction for [`State::extend_table`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Axis {
    /// Append rows; indices must be disjoint.
    Rows,
    /// Append new columns; indices must match.
    Columns,
}

/// All mutable state of one pipeline run.
///
/// Build with [`StateBuilder`].  A `State` is single-threaded; parallel runs
/// use one `State` per worker.
pub struct State {
    pub(crate) context:      Context,
    pub(crate) registry:     Registry,
    /// Table name → salient (modified since the last checkpoint).
    pub(crate) table_status: BTreeMap<String, bool>,
    pub(crate) checkpoints:  Checkpoints,
    pub(crate) rng:          Random,
    pub(crate) store:        Option<Box<dyn CheckpointStore>>,
    settings:                Option<Settings>,
    filesystem:              Option<FileSystem>,
    network_settings:        Option<NetworkSettings>,
    pub(crate) step_stack:   Vec<String>,
}

impl State {
    /// A state with `registry` and nothing else configured.
    pub fn new(registry: Registry) -> Self {
        Self {
            context:          Context::new(),
            registry,
            table_status:     BTreeMap::new(),
            checkpoints:      Checkpoints::default(),
            rng:              Random::new(0),
            store:            None,
            settings:         None,
            filesystem:       None,
            network_settings: None,
            step_stack:       Vec::new(),
        }
    }

    pub fn builder() -> StateBuilder {
        StateBuilder::new()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // ── Context ───────────────────────────────────────────────────────────

    /// Drop everything predicated on `key`, transitively.
    pub(crate) fn invalidate(&mut self, key: &str) {
        let dropped = self.registry.predicates().cascade(key);
        if dropped.is_empty() {
            return;
        }
        for dep in &dropped {
            self.context.remove(dep);
            self.table_status.remove(dep);
        }
        debug!(key, dropped = ?dropped, "context invalidated");
    }

    /// Store `value` under `key`, then drop every dependent key.
    pub fn set<T: Any + Send + Sync>(&mut self, key: &str, value: T) {
        self.set_value(key, Arc::new(value));
    }

    pub fn set_value(&mut self, key: &str, value: ContextValue) {
        self.context.insert(key, value);
        self.invalidate(key);
    }

    pub(crate) fn load(&self, key: &str) -> StateResult<Option<ContextValue>> {
        if let Some(v) = self.context.get(key) {
            return Ok(Some(Arc::clone(v)));
        }
        if let Some(loader) = self.registry.object_loader(key) {
            return loader(self).map(Some);
        }
        if let Some(loader) = self.registry.table_loader(key) {
            return loader(self).map(|t| Some(Arc::new(t) as ContextValue));
        }
        Ok(None)
    }

    /// Typed read.  Absent keys with no loader are a [`StateError::Access`].
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> StateResult<Arc<T>> {
        match self.load(key)? {
            Some(v) => downcast(key, v),
            None => Err(StateError::Access { key: key.to_owned() }),
        }
    }

    pub fn get_or<T: Any + Send + Sync>(&self, key: &str, default: T) -> StateResult<Arc<T>> {
        match self.load(key)? {
            Some(v) => downcast(key, v),
            None => Ok(Arc::new(default)),
        }
    }

    /// Return the stored value, storing `initial` first if the key is absent.
    pub fn access<T: Any + Send + Sync>(&mut self, key: &str, initial: impl FnOnce() -> T) -> StateResult<Arc<T>> {
        if !self.context.contains(key) {
            self.set(key, initial());
        }
        self.get(key)
    }

    /// Remove `key` and everything predicated on it.  Returns whether the key
    /// was present.
    pub fn drop(&mut self, key: &str) -> bool {
        let present = self.context.remove(key).is_some();
        self.invalidate(key);
        present
    }

    /// Stored values only; loadable keys are not counted.
    pub fn contains(&self, key: &str) -> bool {
        self.context.contains(key)
    }

    // ── Typed configuration ───────────────────────────────────────────────

    pub fn settings(&self) -> StateResult<&Settings> {
        self.settings.as_ref().ok_or(StateError::NotInitialized("settings"))
    }

    /// Install run settings.  Also reseeds the random manager, so this must
    /// be called between steps.
    pub fn set_settings(&mut self, settings: Settings) -> StateResult<()> {
        self.rng.set_base_seed(settings.rng_base_seed)?;
        self.settings = Some(settings);
        self.invalidate("settings");
        Ok(())
    }

    pub fn filesystem(&self) -> StateResult<&FileSystem> {
        self.filesystem.as_ref().ok_or(StateError::NotInitialized("filesystem"))
    }

    pub fn set_filesystem(&mut self, filesystem: FileSystem) {
        self.filesystem = Some(filesystem);
        self.invalidate("filesystem");
    }

    pub fn network_settings(&self) -> StateResult<&NetworkSettings> {
        self.network_settings.as_ref().ok_or(StateError::NotInitialized("network_settings"))
    }

    pub fn set_network_settings(&mut self, network: NetworkSettings) {
        self.network_settings = Some(network);
        self.invalidate("network_settings");
    }

    // ── Tables ────────────────────────────────────────────────────────────

    /// Store a table.  Salient unless `salient` says otherwise or `name` is
    /// a registered temporary table.
    ///
    /// Non-salient tables are still recorded (with status `false`), so
    /// [`is_table`](Self::is_table) holds for them; they are only skipped
    /// when the next checkpoint decides what to write.
    pub fn add_table(&mut self, name: &str, table: Table, salient: Option<bool>) {
        let salient = !self.registry.is_temp(name) && salient.unwrap_or(true);
        self.table_status.insert(name.to_owned(), salient);
        debug!(table = name, rows = table.len(), salient, "table added");
        self.set_value(name, Arc::new(table));
    }

    /// Whether `name` was stored through [`add_table`](Self::add_table),
    /// salient or not, and has not been dropped since.
    pub fn is_table(&self, name: &str) -> bool {
        self.table_status.contains_key(name)
    }

    fn current_table(&self, name: &str) -> StateResult<Arc<Table>> {
        match self.context.get(name) {
            Some(v) => downcast(name, Arc::clone(v)),
            None => Err(StateError::Access { key: name.to_owned() }),
        }
    }

    /// The current table, or the version stored at `checkpoint` (`"_"` for
    /// the last one).
    ///
    /// A checkpointed version is the one written at the most recent
    /// checkpoint at or before the named one.
    pub fn get_table(&self, name: &str, checkpoint: Option<&str>) -> StateResult<Arc<Table>> {
        let last_pointer = self.checkpoints.pointer(name);

        if last_pointer.is_none() && self.is_table(name) {
            if let Some(cp) = checkpoint {
                return Err(StateError::NotCheckpointable { table: name.to_owned(), checkpoint: cp.to_owned() });
            }
            return self.current_table(name);
        }

        let Some(cp) = checkpoint else {
            return match last_pointer {
                None => Err(StateError::NeverCheckpointed(name.to_owned())),
                Some("") => Err(StateError::TableDropped(name.to_owned())),
                Some(_) => self.current_table(name),
            };
        };

        let cp = if cp == LAST_CHECKPOINT {
            self.checkpoints
                .last_checkpoint_name()
                .ok_or_else(|| StateError::CheckpointNotFound(cp.to_owned()))?
        } else {
            cp
        };
        let entry = self
            .checkpoints
            .find(cp)
            .ok_or_else(|| StateError::CheckpointNotFound(cp.to_owned()))?;
        let pointer = match entry.tables.get(name).map(String::as_str) {
            Some(p) if !p.is_empty() => p,
            _ => return Err(StateError::TableNotInCheckpoint { table: name.to_owned(), checkpoint: cp.to_owned() }),
        };

        let unchanged = last_pointer == Some(pointer) && self.table_status.get(name) == Some(&false);
        if unchanged && self.context.contains(name) {
            return self.current_table(name);
        }
        let store = self.store.as_ref().ok_or(StateError::NoStore)?;
        let key = tdm_store::pipeline_table_key(name, Some(pointer));
        Ok(Arc::new(store.read_table(&key)?))
    }

    fn ensure_loaded(&mut self, name: &str) -> StateResult<()> {
        if self.context.contains(name) {
            return Ok(());
        }
        let loader = self
            .registry
            .table_loader(name)
            .ok_or_else(|| StateError::NoLoader(name.to_owned()))?;
        let table = loader(self)?;
        self.add_table(name, table, None);
        Ok(())
    }

    /// Current table as a shared handle, loading and caching it through its
    /// registered loader when it is not yet present.
    pub fn get_dataframe_shared(&mut self, name: &str) -> StateResult<Arc<Table>> {
        self.ensure_loaded(name)?;
        self.current_table(name)
    }

    /// Owned copy of the current table, optionally restricted to `columns`.
    pub fn get_dataframe(&mut self, name: &str, columns: Option<&[&str]>) -> StateResult<Table> {
        let table = self.get_dataframe_shared(name)?;
        match columns {
            Some(cols) => Ok(table.select(cols)?),
            None => Ok(Table::clone(&table)),
        }
    }

    /// Add `df` as a new table, or extend the existing one along `axis`.
    ///
    /// Rows: indices must be disjoint; existing column order is kept.
    /// Columns: indices must be identical; only new columns are added.
    pub fn extend_table(&mut self, name: &str, df: Table, axis: Axis) -> StateResult<()> {
        if !self.is_table(name) {
            self.add_table(name, df, None);
            return Ok(());
        }
        let mut table = Table::clone(&*self.get_dataframe_shared(name)?);
        match axis {
            Axis::Rows => table.extend_rows(df)?,
            Axis::Columns => table.extend_columns(df)?,
        }
        self.add_table(name, table, None);
        Ok(())
    }

    /// Remove a table from the context.  Its checkpoint history is kept and
    /// its last pointer marks it as dropped.
    pub fn drop_table(&mut self, name: &str) {
        if self.is_table(name) {
            debug!(table = name, "dropping table");
            self.context.remove(name);
            self.table_status.remove(name);
            self.invalidate(name);
        }
        self.checkpoints.mark_dropped(name);
    }

    /// Names with a registered table loader.
    pub fn registered_tables(&self) -> Vec<String> {
        self.registry.table_names().map(str::to_owned).collect()
    }

    /// Tables currently held in the context.
    pub fn existing_table_names(&self) -> Vec<String> {
        self.table_status.keys().filter(|n| self.context.contains(n)).cloned().collect()
    }

    /// Every table name that is loadable, present, or ever checkpointed.
    pub fn known_table_names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.registry.table_names().map(str::to_owned).collect();
        names.extend(self.table_status.keys().cloned());
        names.extend(self.checkpoints.table_names().map(str::to_owned));
        names.into_iter().collect()
    }

    /// Salient tables: changed since the last checkpoint.
    pub fn uncheckpointed_table_names(&self) -> Vec<String> {
        self.table_status.iter().filter(|(_, salient)| **salient).map(|(n, _)| n.clone()).collect()
    }

    /// Register the random channel for a channel table from its index.
    ///
    /// No-op for tables that are not channel tables or whose channel already
    /// exists.
    pub fn ensure_channel(&mut self, name: &str) -> StateResult<()> {
        if !self.registry.is_channel_table(name) || self.rng.has_channel(name) {
            return Ok(());
        }
        let table = self.get_dataframe_shared(name)?;
        self.rng.add_channel(name, table.index())?;
        Ok(())
    }

    // ── Steps and random streams ──────────────────────────────────────────

    /// Name of the innermost running step.
    pub fn this_step(&self) -> StateResult<&str> {
        self.step_stack.last().map(String::as_str).ok_or(StateError::NotInStep)
    }

    pub fn current_model_name(&self) -> Option<&str> {
        self.rng.step_name()
    }

    pub fn rng(&self) -> &Random {
        &self.rng
    }

    pub fn rng_mut(&mut self) -> &mut Random {
        &mut self.rng
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Wipe checkpoints, tables, context values, and random streams.
    ///
    /// Typed configuration and the registry are kept; the random manager is
    /// reseeded from the settings when present.
    pub fn init_state(&mut self) {
        self.checkpoints = Checkpoints::default();
        self.context.clear();
        self.table_status.clear();
        self.step_stack.clear();
        let seed = self.settings.as_ref().map_or(0, |s| s.rng_base_seed);
        self.rng = Random::new(seed);
    }

    /// Warn about unsaved tables, close the store, and reset the state.
    pub fn close_pipeline(&mut self) -> StateResult<()> {
        let unsaved = self.uncheckpointed_table_names();
        if !unsaved.is_empty() {
            warn!(tables = ?unsaved, "closing pipeline with uncheckpointed tables");
        }
        if let Some(mut store) = self.store.take() {
            store.close()?;
        }
        self.init_state();
        debug!("close_pipeline");
        Ok(())
    }

    /// Whether the `checkpoints` setting asks for a checkpoint after `name`.
    pub fn should_save_checkpoint(&self, name: &str) -> StateResult<bool> {
        Ok(self.settings()?.checkpoints.should_save(name))
    }

    pub fn set_store(&mut self, store: Box<dyn CheckpointStore>) {
        self.store = Some(store);
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Fluent builder for [`State`].
///
/// # Optional inputs
///
/// | Method                    | Default                      |
/// |---------------------------|------------------------------|
/// | `.registry(r)`            | empty [`Registry`]           |
/// | `.settings(s)`            | unset (`NotInitialized`)     |
/// | `.filesystem(f)`          | unset                        |
/// | `.network_settings(n)`    | unset                        |
/// | `.store(s)`               | opened by `open_pipeline`    |
#[derive(Default)]
pub struct StateBuilder {
    registry:         Option<Registry>,
    settings:         Option<Settings>,
    filesystem:       Option<FileSystem>,
    network_settings: Option<NetworkSettings>,
    store:            Option<Box<dyn CheckpointStore>>,
}

impl StateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn filesystem(mut self, filesystem: FileSystem) -> Self {
        self.filesystem = Some(filesystem);
        self
    }

    pub fn network_settings(mut self, network: NetworkSettings) -> Self {
        self.network_settings = Some(network);
        self
    }

    pub fn store(mut self, store: Box<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> State {
        let mut state = State::new(self.registry.unwrap_or_default());
        state.rng = Random::new(self.settings.as_ref().map_or(0, |s| s.rng_base_seed));
        state.settings = self.settings;
        state.filesystem = self.filesystem;
        state.network_settings = self.network_settings;
        state.store = self.store;
        state
    }
}
