use std::sync::Arc;

use tracing::info;

use crate::pipeline::{BuildError, BuildState, Step, StepAction, StepFuture};

/// Generates the ephemeral login key pair.
#[derive(Clone, Copy, Debug, Default)]
pub struct CreateCredentials;

impl Step for CreateCredentials {
    fn name(&self) -> &'static str {
        "create-credentials"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            info!("Creating temporary SSH key for instance...");
            let keys = Arc::clone(&state.services.keys);
            match keys.generate() {
                Ok(pair) => {
                    state.put_ssh_key(pair);
                    StepAction::Continue
                }
                Err(err) => state.halt(BuildError::KeyGeneration(err)),
            }
        })
    }
}
