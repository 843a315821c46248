//! Run observer trait for progress reporting.

use std::time::Duration;

/// Callbacks invoked by [`State::run`](crate::State::run) around each step.
///
/// All methods default to no-ops.
///
/// # Example — step timer
///
/// ```rust,ignore
/// struct Timer;
///
/// impl RunObserver for Timer {
///     fn on_step_end(&mut self, step: &str, elapsed: Duration) {
///         println!("{step}: {:.2}s", elapsed.as_secs_f64());
///     }
/// }
/// ```
pub trait RunObserver {
    fn on_step_start(&mut self, _step: &str) {}

    fn on_step_end(&mut self, _step: &str, _elapsed: Duration) {}

    /// Called after a checkpoint has been written.
    fn on_checkpoint(&mut self, _name: &str) {}
}

/// A [`RunObserver`] that does nothing.
pub struct NoopObserver;

impl RunObserver for NoopObserver {}
