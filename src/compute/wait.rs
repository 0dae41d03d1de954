//! Poll loops for long-running operations and instance status.
//!
//! Both loops follow the same shape: observe cancellation, fetch once, decide,
//! check the deadline, then sleep one interval on the injected [`Clock`]. A
//! fetch that fails is fatal; the loops never retry a failed call. A timeout
//! too large to add to the start instant means the wait has no deadline.

use std::time::Duration;

use tracing::debug;

use crate::cancel::CancelFlag;
use crate::clock::Clock;

use super::types::{Instance, InstanceStatus, Operation, OperationScope, OperationStatus};
use super::{ComputeApi, ComputeError};

/// Default delay between two fetches of the same resource.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Drives operations and instances towards a target state.
#[derive(Clone, Copy)]
pub struct Poller<'a> {
    api: &'a dyn ComputeApi,
    clock: &'a dyn Clock,
    interval: Duration,
    cancel: Option<&'a CancelFlag>,
}

impl<'a> Poller<'a> {
    /// Creates a poller that sleeps `interval` between fetches.
    #[must_use]
    pub const fn new(api: &'a dyn ComputeApi, clock: &'a dyn Clock, interval: Duration) -> Self {
        Self {
            api,
            clock,
            interval,
            cancel: None,
        }
    }

    /// Makes every iteration observe `cancel`.
    #[must_use]
    pub const fn with_cancel(mut self, cancel: &'a CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn check_cancelled(&self) -> Result<(), ComputeError> {
        if self.cancel.is_some_and(CancelFlag::is_cancelled) {
            return Err(ComputeError::Cancelled);
        }
        Ok(())
    }

    /// Polls operation `name` until its status reaches `target`.
    ///
    /// A `DONE` record with a non-empty error payload is a failure even when
    /// `target` is `DONE`.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::OperationFailed`] for provider-reported
    /// failures, [`ComputeError::Timeout`] once `timeout` elapses,
    /// [`ComputeError::Cancelled`] when the flag is raised, and any error from
    /// the fetch itself.
    pub async fn await_operation(
        &self,
        target: OperationStatus,
        scope: &OperationScope,
        name: &str,
        timeout: Duration,
    ) -> Result<Operation, ComputeError> {
        let started = self.clock.now();
        let deadline = started.checked_add(timeout);
        let mut attempts: u32 = 0;

        loop {
            self.check_cancelled()?;

            let operation = match scope {
                OperationScope::Zone(zone) => self.api.get_zone_operation(zone, name).await?,
                OperationScope::Global => self.api.get_global_operation(name).await?,
            };
            attempts += 1;
            debug!(operation = name, %scope, status = %operation.status, attempts, "polled operation");

            if operation.status == OperationStatus::Done
                && let Some(errors) = operation.failure()
            {
                return Err(ComputeError::OperationFailed {
                    operation: name.to_owned(),
                    errors: errors.to_vec(),
                });
            }

            if operation.status >= target {
                return Ok(operation);
            }

            let now = self.clock.now();
            if deadline.is_some_and(|limit| now >= limit) {
                return Err(ComputeError::Timeout {
                    subject: format!("operation {name}"),
                    target: target.to_string(),
                    waited_secs: now.duration_since(started).as_secs(),
                });
            }

            self.clock.sleep(self.interval).await;
        }
    }

    /// Polls instance `name` until it reports `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::UnexpectedInstanceState`] when the instance
    /// terminates while a different status is awaited,
    /// [`ComputeError::Timeout`] once `timeout` elapses,
    /// [`ComputeError::Cancelled`] when the flag is raised, and any error from
    /// the fetch itself.
    pub async fn await_instance_status(
        &self,
        zone: &str,
        name: &str,
        target: InstanceStatus,
        timeout: Duration,
    ) -> Result<Instance, ComputeError> {
        let started = self.clock.now();
        let deadline = started.checked_add(timeout);

        loop {
            self.check_cancelled()?;

            let instance = self.api.get_instance(zone, name).await?;
            debug!(instance = name, status = %instance.status, "polled instance");

            if instance.status == target {
                return Ok(instance);
            }

            if instance.status == InstanceStatus::Terminated {
                return Err(ComputeError::UnexpectedInstanceState {
                    instance: name.to_owned(),
                    status: instance.status,
                    target,
                });
            }

            let now = self.clock.now();
            if deadline.is_some_and(|limit| now >= limit) {
                return Err(ComputeError::Timeout {
                    subject: format!("instance {name}"),
                    target: target.to_string(),
                    waited_secs: now.duration_since(started).as_secs(),
                });
            }

            self.clock.sleep(self.interval).await;
        }
    }
}
