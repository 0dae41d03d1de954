//! Deletes the build instance once its disk has been captured.

use tracing::warn;

use crate::pipeline::{BuildError, BuildState, CleanupFailure, Step, StepAction, StepFuture};

use super::create_instance::delete_instance;

/// Final step of a successful build. The instance only exists to produce the
/// archive, so it is removed as soon as the image is registered.
///
/// The image already exists at this point, so a failed delete never halts
/// the build: it is recorded as a cleanup notice and handed back with the
/// artifact.
#[derive(Clone, Copy, Debug, Default)]
pub struct TeardownInstance;

impl TeardownInstance {
    async fn teardown(state: &BuildState) -> Result<(), BuildError> {
        let name = state.instance_name()?.to_owned();
        delete_instance(state, &name).await
    }
}

impl Step for TeardownInstance {
    fn name(&self) -> &'static str {
        "teardown-instance"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            if let Err(err) = Self::teardown(state).await {
                warn!(error = %err, "instance teardown failed; keeping the captured image");
                state.record_cleanup_failure(CleanupFailure {
                    step: self.name(),
                    message: err.to_string(),
                });
            }
            StepAction::Continue
        })
    }
}
