use tracing::info;

use crate::pipeline::{BuildError, BuildState, Step, StepAction, StepFuture};

use super::run_checked;

/// Runs the configured provisioning commands in order, stopping at the
/// first failure.
#[derive(Clone, Copy, Debug, Default)]
pub struct Provision;

impl Provision {
    async fn provision(state: &BuildState) -> Result<(), BuildError> {
        let session = state.session()?;
        let commands = &state.request.provision_commands;
        if commands.is_empty() {
            info!("No provisioning commands configured");
            return Ok(());
        }

        for (index, command) in commands.iter().enumerate() {
            info!(step = index + 1, total = commands.len(), %command, "Provisioning...");
            run_checked(session, "Error provisioning instance", command).await?;
        }
        Ok(())
    }
}

impl Step for Provision {
    fn name(&self) -> &'static str {
        "provision"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            match Self::provision(state).await {
                Ok(()) => StepAction::Continue,
                Err(err) => state.halt(err),
            }
        })
    }
}
