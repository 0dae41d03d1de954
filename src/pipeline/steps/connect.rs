use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info};

use crate::pipeline::{BuildError, BuildState, Step, StepAction, StepFuture};
use crate::remote::SessionTarget;

/// Waits for SSH to accept connections and opens the remote session.
///
/// Checks use the request's poll interval and give up after
/// `ssh_timeout`; a budget too large to represent never expires.
/// Cancellation is observed between checks.
#[derive(Clone, Copy, Debug, Default)]
pub struct Connect;

impl Connect {
    async fn connect(state: &mut BuildState) -> Result<(), BuildError> {
        let address = SocketAddr::new(state.instance_address()?, state.request.ssh_port);
        let connector = Arc::clone(&state.services.connector);
        let clock = Arc::clone(&state.services.clock);

        info!(%address, "Waiting for SSH to become available...");
        let started = clock.now();
        let deadline = started.checked_add(state.request.ssh_timeout);
        loop {
            if state.cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            if connector.is_reachable(address).await {
                break;
            }
            let now = clock.now();
            if deadline.is_some_and(|limit| now >= limit) {
                return Err(BuildError::ConnectTimeout {
                    address,
                    waited_secs: now.duration_since(started).as_secs(),
                });
            }
            debug!(%address, "SSH not reachable yet");
            clock.sleep(state.request.poll_interval).await;
        }

        let target = SessionTarget {
            address,
            username: state.request.ssh_username.clone(),
            key: state.ssh_key()?.clone(),
        };
        let session = connector
            .open(&target)
            .map_err(|err| BuildError::remote("Error opening SSH session", err))?;
        info!(%address, "Connected to SSH!");
        state.put_session(session);
        Ok(())
    }
}

impl Step for Connect {
    fn name(&self) -> &'static str {
        "connect"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            match Self::connect(state).await {
                Ok(()) => StepAction::Continue,
                Err(err) => state.halt(err),
            }
        })
    }
}
