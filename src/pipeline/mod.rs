//! Step pipeline with reverse-order cleanup.
//!
//! A [`Runner`] executes its steps strictly in order against one
//! [`BuildState`]. When a step halts, no further step runs and every step
//! that had already continued is cleaned up in reverse order. Cleanup
//! failures are collected but never replace the error that caused the halt.

use std::future::Future;
use std::pin::Pin;

use tracing::{info, warn};

mod error;
mod state;
pub mod steps;

pub use error::{BuildError, CleanupFailure};
pub use state::{BuildState, Services};

/// Boxed future returned by [`Step`] methods.
pub type StepFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of running a step.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepAction {
    /// Proceed to the next step.
    Continue,
    /// Stop and unwind. The step must have recorded the reason with
    /// [`BuildState::halt`].
    Halt,
}

/// One unit of the build.
pub trait Step: Send {
    /// Stable name used in logs and cleanup notices.
    fn name(&self) -> &'static str;

    /// Performs the step's work.
    fn run<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, StepAction>;

    /// Releases whatever [`Step::run`] allocated. Called only after `run`
    /// continued and a later step halted.
    fn cleanup<'a>(
        &'a mut self,
        _state: &'a mut BuildState,
    ) -> StepFuture<'a, Result<(), BuildError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Scheduling hook invoked after every step that continues.
pub trait PauseHook: Send + Sync {
    /// Resolves when the build may proceed past `step`.
    fn pause<'a>(&'a self, step: &'a str) -> StepFuture<'a, ()>;
}

/// Executes an ordered list of steps.
pub struct Runner {
    steps: Vec<Box<dyn Step>>,
    pause: Option<Box<dyn PauseHook>>,
}

impl Runner {
    /// Creates a runner for `steps`.
    #[must_use]
    pub const fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self { steps, pause: None }
    }

    /// Installs a hook that suspends the build after each continued step.
    #[must_use]
    pub fn with_pause(mut self, pause: Box<dyn PauseHook>) -> Self {
        self.pause = Some(pause);
        self
    }

    /// Names of the configured steps, in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    /// Runs every step, unwinding on the first halt or cancellation.
    ///
    /// # Errors
    ///
    /// Returns the error recorded by the halting step, [`BuildError::Cancelled`]
    /// when cancellation was observed at a step boundary, or
    /// [`BuildError::HaltWithoutError`] when a step halted silently.
    pub async fn run(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        let Some(completed) = self.run_forward(state).await else {
            return Ok(());
        };

        self.unwind(state, completed).await;

        Err(state.take_error().unwrap_or_else(|| BuildError::HaltWithoutError {
            step: self
                .steps
                .get(completed)
                .map_or("unknown", |step| step.name()),
        }))
    }

    /// Returns the number of steps that continued when the build stopped
    /// early, or `None` when every step continued.
    async fn run_forward(&mut self, state: &mut BuildState) -> Option<usize> {
        for (index, step) in self.steps.iter_mut().enumerate() {
            let name = step.name();
            if state.cancel.is_cancelled() {
                warn!(step = name, "build cancelled");
                state.halt(BuildError::Cancelled);
                return Some(index);
            }

            info!(step = name, "running step");
            if step.run(state).await == StepAction::Halt {
                if !state.has_error() {
                    state.halt(BuildError::HaltWithoutError { step: name });
                }
                return Some(index);
            }

            if let Some(pause) = &self.pause {
                pause.pause(name).await;
            }
        }
        None
    }

    async fn unwind(&mut self, state: &mut BuildState, completed: usize) {
        for step in self.steps.iter_mut().take(completed).rev() {
            let name = step.name();
            info!(step = name, "cleaning up");
            if let Err(err) = step.cleanup(state).await {
                warn!(step = name, error = %err, "cleanup failed");
                state.record_cleanup_failure(CleanupFailure {
                    step: name,
                    message: err.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests;
