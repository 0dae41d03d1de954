use tracing::info;

use crate::pipeline::{BuildError, BuildState, Step, StepAction, StepFuture};

use super::run_checked;

const UPDATE_COMMAND: &str = "sudo gsutil update -n -f";

/// Updates `gsutil` on the instance so the capture upload never stops at an
/// interactive update prompt.
#[derive(Clone, Copy, Debug, Default)]
pub struct RefreshGsutil;

impl RefreshGsutil {
    async fn refresh(state: &BuildState) -> Result<(), BuildError> {
        info!("Updating gsutil...");
        run_checked(state.session()?, "Error updating gsutil", UPDATE_COMMAND).await?;
        Ok(())
    }
}

impl Step for RefreshGsutil {
    fn name(&self) -> &'static str {
        "refresh-gsutil"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            match Self::refresh(state).await {
                Ok(()) => StepAction::Continue,
                Err(err) => state.halt(err),
            }
        })
    }
}
