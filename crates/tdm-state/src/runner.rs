//! Step runner: open or resume the pipeline, run steps in order, checkpoint.
//!
//! # Step names
//!
//! | Name            | Behaviour                                        |
//! |-----------------|--------------------------------------------------|
//! | `tour_od_choice`| run, then checkpoint as `tour_od_choice` if the `checkpoints` setting allows |
//! | `_write_debug`  | run step `write_debug`, never checkpoint          |
//!
//! A fresh run starts with the `init` checkpoint.  A resumed run restores the
//! named checkpoint (or the last, for `"_"`) and skips every step up to and
//! including it.  Salient tables left after the last step are written to a
//! `final` checkpoint.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, info_span};

use tdm_store::open_store;

use crate::checkpoint::{Checkpoints, LAST_CHECKPOINT};
use crate::context::ContextValue;
use crate::{RunObserver, State, StateError, StateResult, StepInputs};

/// Steps whose name starts with this prefix are never checkpointed.
pub const NO_CHECKPOINT_PREFIX: &str = "_";

pub const INITIAL_CHECKPOINT_NAME: &str = "init";
pub const FINAL_CHECKPOINT_NAME: &str = "final";

impl State {
    /// Run one registered step inside its own random-stream step.
    pub fn run_step(&mut self, name: &str) -> StateResult<()> {
        let step_name = name.strip_prefix(NO_CHECKPOINT_PREFIX).unwrap_or(name);
        let step = self
            .registry
            .step(step_name)
            .ok_or_else(|| StateError::StepNotFound(step_name.to_owned()))?;

        let span = info_span!("step", name = step_name);
        let _enter = span.enter();
        info!("running step");

        self.rng.begin_step(step_name)?;
        self.step_stack.push(step_name.to_owned());

        let result = self.resolve_inputs(step_name, step.inputs()).and_then(|inputs| step.run(self, &inputs));

        self.step_stack.pop();
        self.rng.end_step(step_name)?;
        result
    }

    fn resolve_inputs(&mut self, step: &str, names: &[&str]) -> StateResult<StepInputs> {
        let mut inputs = StepInputs::new(step);
        for &input in names {
            let value: ContextValue = if self.is_table(input) || self.registry.table_loader(input).is_some() {
                self.get_dataframe_shared(input)? as ContextValue
            } else if let Some(v) = self.load(input)? {
                if !self.contains(input) {
                    self.set_value(input, Arc::clone(&v));
                }
                v
            } else {
                return Err(StateError::MissingInput { step: step.to_owned(), input: input.to_owned() });
            };
            inputs.insert(input, value);
        }
        Ok(inputs)
    }

    /// Open the checkpoint store and either restore `resume_after` or start
    /// fresh with the `init` checkpoint.  Returns the restored checkpoint
    /// name.
    pub fn open_pipeline(&mut self, resume_after: Option<&str>) -> StateResult<Option<String>> {
        if self.store.is_none() {
            let path = self.filesystem()?.get_pipeline_path();
            let store = open_store(&self.settings()?.checkpoint_format, &path)?;
            self.store = Some(store);
        }

        match resume_after {
            Some(cp) => {
                self.restore(cp)?;
                let restored = self
                    .last_checkpoint_name()
                    .ok_or_else(|| StateError::CheckpointNotFound(LAST_CHECKPOINT.to_owned()))?;
                Ok(Some(restored.to_owned()))
            }
            None => {
                self.checkpoints = Checkpoints::default();
                self.add_checkpoint(INITIAL_CHECKPOINT_NAME)?;
                Ok(None)
            }
        }
    }

    /// Run `models` in order, resuming after `resume_after` when given.
    pub fn run(&mut self, models: &[String], resume_after: Option<&str>, observer: &mut impl RunObserver) -> StateResult<()> {
        let resumed = self.open_pipeline(resume_after)?;
        let start = match resumed.as_deref() {
            None | Some(INITIAL_CHECKPOINT_NAME) => 0,
            Some(FINAL_CHECKPOINT_NAME) => models.len(),
            Some(cp) => {
                models
                    .iter()
                    .position(|m| m == cp)
                    .ok_or_else(|| StateError::StepNotFound(cp.to_owned()))?
                    + 1
            }
        };
        if start > 0 {
            info!(skipped = start, "resuming pipeline");
        }

        for model in &models[start..] {
            observer.on_step_start(model);
            let t0 = Instant::now();
            self.run_step(model)?;
            observer.on_step_end(model, t0.elapsed());

            if !model.starts_with(NO_CHECKPOINT_PREFIX) && self.should_save_checkpoint(model)? {
                self.add_checkpoint(model)?;
                observer.on_checkpoint(model);
            }
        }

        if !self.uncheckpointed_table_names().is_empty() {
            self.add_checkpoint(FINAL_CHECKPOINT_NAME)?;
            observer.on_checkpoint(FINAL_CHECKPOINT_NAME);
        }
        Ok(())
    }

    /// [`run`](Self::run) with `models` and `resume_after` from the settings.
    pub fn run_all(&mut self, observer: &mut impl RunObserver) -> StateResult<()> {
        let settings = self.settings()?;
        let models = settings.models.clone();
        let resume_after = settings.resume_after.clone();
        self.run(&models, resume_after.as_deref(), observer)
    }
}
