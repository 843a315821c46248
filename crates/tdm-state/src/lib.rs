//! `tdm-state` — pipeline state, checkpoints, and the step runner.
//!
//! # Pieces
//!
//! | Module          | Contents                                                   |
//! |-----------------|------------------------------------------------------------|
//! | [`context`]     | type-erased key → value map                                |
//! | [`predicates`]  | acyclic invalidation graph (`PredicateGraphBuilder`)       |
//! | [`registry`]    | table/object loaders, steps, temp and channel tables       |
//! | [`state`]       | `State`: context ops, table registry, typed configuration  |
//! | [`checkpoint`]  | append-only checkpoint log, `add_checkpoint`, `restore_from` |
//! | [`step`]        | `Step` trait, `StepInputs`                                 |
//! | [`runner`]      | `run_step`, `open_pipeline`, `run`                         |
//! | [`observer`]    | `RunObserver` progress callbacks                           |
//!
//! # Cargo features
//!
//! | Feature   | Effect                                        |
//! |-----------|-----------------------------------------------|
//! | `sqlite`  | Enables the SQLite checkpoint store.          |
//! | `parquet` | Enables the Parquet checkpoint store.         |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use tdm_core::{FileSystem, Settings};
//! use tdm_state::{NoopObserver, Registry, State};
//!
//! let registry = Registry::builder()
//!     .table("land_use", load_land_use)
//!     .step(TourOdChoice::default())
//!     .build()?;
//! let mut state = State::builder()
//!     .registry(registry)
//!     .settings(settings)
//!     .filesystem(FileSystem::new("."))
//!     .build();
//! state.run_all(&mut NoopObserver)?;
//! state.close_pipeline()?;
//! ```

pub mod checkpoint;
pub mod context;
pub mod error;
pub mod observer;
pub mod predicates;
pub mod registry;
pub mod runner;
pub mod state;
pub mod step;


pub use checkpoint::{Checkpoint, Checkpoints, LAST_CHECKPOINT};
pub use context::{Context, ContextValue};
pub use error::{StateError, StateResult};
pub use observer::{NoopObserver, RunObserver};
pub use predicates::{PredicateGraph, PredicateGraphBuilder};
pub use registry::{ObjectLoader, Registry, RegistryBuilder, TableLoader};
pub use runner::{FINAL_CHECKPOINT_NAME, INITIAL_CHECKPOINT_NAME, NO_CHECKPOINT_PREFIX};
pub use state::{Axis, State, StateBuilder};
pub use step::{Step, StepInputs};
