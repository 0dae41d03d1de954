//! The captured image handed back to the caller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::clock::Clock;
use crate::compute::{ComputeApi, ComputeError, OperationScope, OperationStatus, Poller};
use crate::pipeline::CleanupFailure;

/// Identifier of the builder that produced an [`Artifact`].
pub const BUILDER_ID: &str = "kiln.googlecompute";

/// Image produced by a successful build, together with what is needed to
/// delete it again.
#[derive(Clone)]
pub struct Artifact {
    image_name: String,
    compute: Arc<dyn ComputeApi>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    timeout: Duration,
    cleanup_failures: Vec<CleanupFailure>,
}

impl Artifact {
    /// Wraps an existing image.
    #[must_use]
    pub fn new(
        image_name: impl Into<String>,
        compute: Arc<dyn ComputeApi>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            image_name: image_name.into(),
            compute,
            clock,
            poll_interval: crate::compute::wait::DEFAULT_POLL_INTERVAL,
            timeout: Duration::from_secs(300),
            cleanup_failures: Vec::new(),
        }
    }

    /// Overrides how deletion is polled.
    #[must_use]
    pub const fn with_polling(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.timeout = timeout;
        self
    }

    /// Attaches cleanup notices from the build that produced the image.
    #[must_use]
    pub fn with_cleanup_failures(mut self, failures: Vec<CleanupFailure>) -> Self {
        self.cleanup_failures = failures;
        self
    }

    /// Resources the build could not remove, such as an instance whose
    /// teardown failed after the image was captured.
    #[must_use]
    pub fn cleanup_failures(&self) -> &[CleanupFailure] {
        &self.cleanup_failures
    }

    /// Builder that produced the artifact.
    #[must_use]
    pub const fn builder_id(&self) -> &'static str {
        BUILDER_ID
    }

    /// Name of the captured image.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.image_name
    }

    /// Deletes the image and waits for the deletion to finish.
    ///
    /// # Errors
    ///
    /// Returns the [`ComputeError`] from the delete call or from polling its
    /// operation, including provider-reported failures.
    pub async fn destroy(&self) -> Result<(), ComputeError> {
        info!(image = %self.image_name, "Deleting image...");
        let operation = self.compute.delete_image(&self.image_name).await?;
        Poller::new(self.compute.as_ref(), self.clock.as_ref(), self.poll_interval)
            .await_operation(
                OperationStatus::Done,
                &OperationScope::Global,
                operation.name.as_str(),
                self.timeout,
            )
            .await?;
        info!(image = %self.image_name, "Image deleted");
        Ok(())
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A disk image was created: {}", self.image_name)
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("image_name", &self.image_name)
            .field("project", &self.compute.project_id())
            .field("cleanup_failures", &self.cleanup_failures)
            .finish_non_exhaustive()
    }
}
