//! Static registrations owned by a [`State`]: table loaders, object loaders,
//! steps, temporary table names, random channel tables, and predicates.
//!
//! Everything is declared up front through [`RegistryBuilder`] and frozen by
//! [`build`](RegistryBuilder::build), which also validates the predicate
//! graph.  Nothing is registered globally; two `State`s in one process can
//! carry different registries.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tdm_core::Table;

use crate::context::ContextValue;
use crate::predicates::{PredicateGraph, PredicateGraphBuilder};
use crate::{State, StateError, StateResult, Step};

/// Computes a table on demand from the current state.
pub type TableLoader = Box<dyn Fn(&State) -> StateResult<Table> + Send + Sync>;

/// Computes a non-table context value on demand.
pub type ObjectLoader = Box<dyn Fn(&State) -> StateResult<ContextValue> + Send + Sync>;

/// Frozen registrations.  See the module docs.
#[derive(Default)]
pub struct Registry {
    tables:         BTreeMap<String, TableLoader>,
    objects:        BTreeMap<String, ObjectLoader>,
    steps:          BTreeMap<String, Arc<dyn Step>>,
    temp_tables:    BTreeSet<String>,
    channel_tables: BTreeSet<String>,
    predicates:     PredicateGraph,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn table_loader(&self, name: &str) -> Option<&TableLoader> {
        self.tables.get(name)
    }

    pub fn object_loader(&self, name: &str) -> Option<&ObjectLoader> {
        self.objects.get(name)
    }

    pub fn step(&self, name: &str) -> Option<Arc<dyn Step>> {
        self.steps.get(name).cloned()
    }

    pub fn has_step(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// Temporary tables are never checkpointed.
    pub fn is_temp(&self, name: &str) -> bool {
        self.temp_tables.contains(name)
    }

    /// Tables whose index is the domain of a random channel of the same name.
    pub fn is_channel_table(&self, name: &str) -> bool {
        self.channel_tables.contains(name)
    }

    pub fn channel_tables(&self) -> impl Iterator<Item = &str> {
        self.channel_tables.iter().map(String::as_str)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    pub fn predicates(&self) -> &PredicateGraph {
        &self.predicates
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Fluent builder for [`Registry`].
///
/// # Example
///
/// ```rust,ignore
/// let registry = Registry::builder()
///     .table("land_use", |state| load_land_use(state))
///     .object("skim_dict", |state| Ok(SkimDict::load(state)?))
///     .predicate("skim_dict", "network_settings")
///     .channel_table("tours")
///     .temp_table("trips")
///     .step(TourOdChoice::default())
///     .build()?;
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    tables:         BTreeMap<String, TableLoader>,
    objects:        BTreeMap<String, ObjectLoader>,
    steps:          BTreeMap<String, Arc<dyn Step>>,
    temp_tables:    BTreeSet<String>,
    channel_tables: BTreeSet<String>,
    predicates:     PredicateGraphBuilder,
    duplicate:      Option<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn note_duplicate(&mut self, name: &str, taken: bool) {
        if taken && self.duplicate.is_none() {
            self.duplicate = Some(name.to_owned());
        }
    }

    fn name_taken(&self, name: &str) -> bool {
        self.tables.contains_key(name) || self.objects.contains_key(name)
    }

    /// Register a table loader.  Loaded tables are computed lazily; only
    /// `State::get_dataframe` caches them.
    pub fn table<F>(mut self, name: &str, loader: F) -> Self
    where
        F: Fn(&State) -> StateResult<Table> + Send + Sync + 'static,
    {
        let taken = self.name_taken(name);
        self.note_duplicate(name, taken);
        self.tables.insert(name.to_owned(), Box::new(loader));
        self
    }

    /// Register a typed object loader.
    pub fn object<T, F>(mut self, name: &str, loader: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&State) -> StateResult<T> + Send + Sync + 'static,
    {
        let taken = self.name_taken(name);
        self.note_duplicate(name, taken);
        let erased: ObjectLoader = Box::new(move |state: &State| loader(state).map(|v| Arc::new(v) as ContextValue));
        self.objects.insert(name.to_owned(), erased);
        self
    }

    pub fn step(mut self, step: impl Step + 'static) -> Self {
        let name = step.name().to_owned();
        let taken = self.steps.contains_key(&name);
        self.note_duplicate(&name, taken);
        self.steps.insert(name, Arc::new(step));
        self
    }

    pub fn temp_table(mut self, name: &str) -> Self {
        self.temp_tables.insert(name.to_owned());
        self
    }

    pub fn channel_table(mut self, name: &str) -> Self {
        self.channel_tables.insert(name.to_owned());
        self
    }

    /// `dependent` is dropped whenever `on` is set or dropped.
    pub fn predicate(mut self, dependent: &str, on: &str) -> Self {
        self.predicates.predicate(dependent, on);
        self
    }

    /// Freeze the registry.  Fails on a duplicate name or a predicate cycle.
    pub fn build(self) -> StateResult<Registry> {
        if let Some(name) = self.duplicate {
            return Err(StateError::DuplicateRegistration(name));
        }
        Ok(Registry {
            tables:         self.tables,
            objects:        self.objects,
            steps:          self.steps,
            temp_tables:    self.temp_tables,
            channel_tables: self.channel_tables,
            predicates:     self.predicates.build()?,
        })
    }
}
