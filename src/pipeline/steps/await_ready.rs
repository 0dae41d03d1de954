use tracing::info;

use crate::compute::{ComputeError, InstanceStatus, OperationScope, OperationStatus};
use crate::pipeline::{BuildError, BuildState, Step, StepAction, StepFuture};

/// Waits for the creation operation and the instance to settle, then records
/// the instance's external address.
#[derive(Clone, Copy, Debug, Default)]
pub struct AwaitInstanceReady;

impl AwaitInstanceReady {
    async fn wait(state: &mut BuildState) -> Result<(), BuildError> {
        let zone = state.request.zone.clone();
        let timeout = state.request.state_timeout;
        let instance = state.instance_name()?.to_owned();
        let operation = state.creation_operation()?.clone();

        info!(instance = %instance, "Waiting for instance to become ready...");
        state
            .poller()
            .await_operation(
                OperationStatus::Done,
                &OperationScope::Zone(zone.clone()),
                operation.as_str(),
                timeout,
            )
            .await
            .map_err(|err| BuildError::compute("Error creating instance", err))?;

        let running = state
            .poller()
            .await_instance_status(&zone, &instance, InstanceStatus::Running, timeout)
            .await
            .map_err(|err| BuildError::compute("Error waiting for instance to start", err))?;

        let address = running.nat_ip().ok_or_else(|| {
            BuildError::compute(
                "Error reading instance address",
                ComputeError::MissingNatIp {
                    instance: instance.clone(),
                },
            )
        })?;

        info!(instance = %instance, %address, "Instance is running");
        state.put_instance_address(address);
        Ok(())
    }
}

impl Step for AwaitInstanceReady {
    fn name(&self) -> &'static str {
        "await-instance-ready"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            match Self::wait(state).await {
                Ok(()) => StepAction::Continue,
                Err(err) => state.halt(err),
            }
        })
    }
}
