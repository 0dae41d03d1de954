//! Typed state threaded through every step of a build.
//!
//! Each slot is written by exactly one step and read by the steps after it.
//! Reading a slot that was never written is an internal-consistency fault and
//! surfaces as [`BuildError::MissingState`].

use std::net::IpAddr;
use std::sync::Arc;

use tracing::error;

use crate::cancel::CancelFlag;
use crate::clock::Clock;
use crate::compute::{ComputeApi, OperationName, Poller};
use crate::config::BuildRequest;
use crate::remote::{Connector, KeyGenerator, RemoteSession, SshKeyPair};

use super::{BuildError, CleanupFailure, StepAction};

/// Collaborators shared by every step.
#[derive(Clone)]
pub struct Services {
    /// Compute Engine client.
    pub compute: Arc<dyn ComputeApi>,
    /// Time source for every wait loop.
    pub clock: Arc<dyn Clock>,
    /// Opens remote sessions to the instance.
    pub connector: Arc<dyn Connector>,
    /// Produces the login key pair.
    pub keys: Arc<dyn KeyGenerator>,
}

/// State of one build run.
pub struct BuildState {
    /// Validated build settings.
    pub request: BuildRequest,
    /// Shared collaborators.
    pub services: Services,
    /// Cooperative cancellation flag.
    pub cancel: CancelFlag,
    ssh_key: Option<SshKeyPair>,
    instance_name: Option<String>,
    creation_operation: Option<OperationName>,
    instance_address: Option<IpAddr>,
    session: Option<Box<dyn RemoteSession>>,
    image_name: Option<String>,
    error: Option<BuildError>,
    cleanup_failures: Vec<CleanupFailure>,
}

impl BuildState {
    /// Creates an empty state for `request`.
    #[must_use]
    pub fn new(request: BuildRequest, services: Services, cancel: CancelFlag) -> Self {
        Self {
            request,
            services,
            cancel,
            ssh_key: None,
            instance_name: None,
            creation_operation: None,
            instance_address: None,
            session: None,
            image_name: None,
            error: None,
            cleanup_failures: Vec::new(),
        }
    }

    /// Poller for forward progress; observes the cancellation flag.
    #[must_use]
    pub fn poller(&self) -> Poller<'_> {
        self.cleanup_poller().with_cancel(&self.cancel)
    }

    /// Poller for cleanup; ignores cancellation so teardown always completes.
    #[must_use]
    pub fn cleanup_poller(&self) -> Poller<'_> {
        Poller::new(
            self.services.compute.as_ref(),
            self.services.clock.as_ref(),
            self.request.poll_interval,
        )
    }

    /// Records `err` as the reason for halting and returns
    /// [`StepAction::Halt`]. The first recorded error wins.
    pub fn halt(&mut self, err: BuildError) -> StepAction {
        error!(error = %err, "step failed");
        if self.error.is_none() {
            self.error = Some(err);
        }
        StepAction::Halt
    }

    /// Returns `true` once a step has recorded an error.
    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Removes and returns the recorded error.
    pub const fn take_error(&mut self) -> Option<BuildError> {
        self.error.take()
    }

    pub(crate) fn record_cleanup_failure(&mut self, failure: CleanupFailure) {
        self.cleanup_failures.push(failure);
    }

    /// Cleanup failures collected while unwinding.
    #[must_use]
    pub fn cleanup_failures(&self) -> &[CleanupFailure] {
        &self.cleanup_failures
    }

    pub(crate) fn take_cleanup_failures(&mut self) -> Vec<CleanupFailure> {
        std::mem::take(&mut self.cleanup_failures)
    }

    /// Stores the generated login key pair.
    pub fn put_ssh_key(&mut self, key: SshKeyPair) {
        self.ssh_key = Some(key);
    }

    /// Login key pair written by the credentials step.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MissingState`] when no key was stored.
    pub fn ssh_key(&self) -> Result<&SshKeyPair, BuildError> {
        self.ssh_key
            .as_ref()
            .ok_or(BuildError::MissingState { key: "ssh_key" })
    }

    /// Stores the name of the created instance.
    pub fn put_instance_name(&mut self, name: impl Into<String>) {
        self.instance_name = Some(name.into());
    }

    /// Name of the instance written by the create-instance step.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MissingState`] when no instance was recorded.
    pub fn instance_name(&self) -> Result<&str, BuildError> {
        self.instance_name
            .as_deref()
            .ok_or(BuildError::MissingState {
                key: "instance_name",
            })
    }

    /// Stores the accepted instance-creation operation.
    pub fn put_creation_operation(&mut self, name: OperationName) {
        self.creation_operation = Some(name);
    }

    /// Instance-creation operation written by the create-instance step.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MissingState`] when no operation was recorded.
    pub fn creation_operation(&self) -> Result<&OperationName, BuildError> {
        self.creation_operation
            .as_ref()
            .ok_or(BuildError::MissingState {
                key: "creation_operation",
            })
    }

    /// Stores the instance's external address.
    pub const fn put_instance_address(&mut self, address: IpAddr) {
        self.instance_address = Some(address);
    }

    /// External address written by the await-instance-ready step.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MissingState`] when no address was recorded.
    pub fn instance_address(&self) -> Result<IpAddr, BuildError> {
        self.instance_address.ok_or(BuildError::MissingState {
            key: "instance_address",
        })
    }

    /// Stores the open remote session.
    pub fn put_session(&mut self, session: Box<dyn RemoteSession>) {
        self.session = Some(session);
    }

    /// Remote session written by the connect step.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MissingState`] when no session is open.
    pub fn session(&self) -> Result<&dyn RemoteSession, BuildError> {
        self.session
            .as_deref()
            .ok_or(BuildError::MissingState { key: "session" })
    }

    /// Stores the name of the captured image.
    pub fn put_image_name(&mut self, name: impl Into<String>) {
        self.image_name = Some(name.into());
    }

    /// Name of the captured image, once the capture step succeeded.
    #[must_use]
    pub fn image_name(&self) -> Option<&str> {
        self.image_name.as_deref()
    }
}
