//! Error type for pipeline state operations.

use thiserror::Error;

use tdm_core::CoreError;
use tdm_store::StoreError;

/// Errors raised by [`State`](crate::State), the checkpoint manager, and the
/// step runner.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state access error: '{key}' is not in the context and has no loader")]
    Access { key: String },

    #[error("{0} is not initialized")]
    NotInitialized(&'static str),

    #[error("context value '{key}' is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("table '{0}' has no loading function")]
    NoLoader(String),

    #[error("'{0}' is registered twice")]
    DuplicateRegistration(String),

    #[error("checkpoint '{0}' not in checkpoints.")]
    CheckpointNotFound(String),

    #[error("table '{table}' not in checkpoint '{checkpoint}'.")]
    TableNotInCheckpoint { table: String, checkpoint: String },

    #[error("table '{0}' never checkpointed.")]
    NeverCheckpointed(String),

    #[error("table '{0}' was dropped.")]
    TableDropped(String),

    #[error("checkpoint '{checkpoint}' requested for non-checkpointed table '{table}'")]
    NotCheckpointable { table: String, checkpoint: String },

    #[error("checkpoint store is not open")]
    NoStore,

    #[error("not in a step")]
    NotInStep,

    #[error("step '{0}' is not registered")]
    StepNotFound(String),

    #[error("step '{step}' input '{input}' is not a table, object, or context key")]
    MissingInput { step: String, input: String },

    #[error("predicate graph has a cycle through {0:?}")]
    PredicateCycle(Vec<String>),

    #[error("step '{step}' failed: {source}")]
    Model {
        step:   String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StateError {
    /// Wrap a model-level error raised inside `step`.
    pub fn model(step: &str, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        StateError::Model { step: step.to_owned(), source: Box::new(source) }
    }
}

/// Shorthand result type for `tdm-state`.
pub type StateResult<T> = Result<T, StateError>;
