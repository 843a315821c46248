//! The `Step` trait implemented by every model step.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use tdm_core::Table;

use crate::context::{ContextValue, downcast};
use crate::{State, StateError, StateResult};

/// One runnable model step.
///
/// The runner resolves [`inputs`](Step::inputs) by name before calling
/// [`run`](Step::run): table names load (and cache) through the table
/// registry, other names resolve against the context and object loaders.
/// Outputs are written back explicitly with `State::add_table` and friends.
///
/// # Example
///
/// ```rust,ignore
/// struct CountTours;
///
/// impl Step for CountTours {
///     fn name(&self) -> &str { "count_tours" }
///     fn inputs(&self) -> &[&str] { &["tours"] }
///     fn run(&self, state: &mut State, inputs: &StepInputs) -> StateResult<()> {
///         let n = inputs.table("tours")?.len();
///         state.set("tour_count", n as i64);
///         Ok(())
///     }
/// }
/// ```
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    /// Names this step needs resolved before it runs.
    fn inputs(&self) -> &[&str] {
        &[]
    }

    fn run(&self, state: &mut State, inputs: &StepInputs) -> StateResult<()>;
}

/// Inputs resolved by the runner for one step invocation.
pub struct StepInputs {
    step:   String,
    values: BTreeMap<String, ContextValue>,
}

impl StepInputs {
    pub(crate) fn new(step: &str) -> Self {
        Self { step: step.to_owned(), values: BTreeMap::new() }
    }

    pub(crate) fn insert(&mut self, name: &str, value: ContextValue) {
        self.values.insert(name.to_owned(), value);
    }

    fn raw(&self, name: &str) -> StateResult<ContextValue> {
        self.values.get(name).cloned().ok_or_else(|| StateError::MissingInput {
            step:  self.step.clone(),
            input: name.to_owned(),
        })
    }

    pub fn table(&self, name: &str) -> StateResult<Arc<Table>> {
        downcast(name, self.raw(name)?)
    }

    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> StateResult<Arc<T>> {
        downcast(name, self.raw(name)?)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}
