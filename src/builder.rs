//! Entry point that wires a request, its collaborators and the default
//! steps into a single build.

use std::fmt;

use thiserror::Error;
use tracing::{info, warn};

use crate::artifact::Artifact;
use crate::cancel::CancelFlag;
use crate::config::BuildRequest;
use crate::pipeline::steps::default_steps;
use crate::pipeline::{BuildError, BuildState, CleanupFailure, PauseHook, Runner, Services};

/// Failed build: the error that stopped it plus any cleanup that also
/// failed while unwinding.
#[derive(Debug, Error)]
#[error("{error}{}", CleanupNotes(.cleanup_failures))]
pub struct BuildFailure {
    /// Primary error.
    #[source]
    pub error: Box<BuildError>,
    /// Advisory notices for resources that may need manual removal.
    pub cleanup_failures: Vec<CleanupFailure>,
}

struct CleanupNotes<'a>(&'a [CleanupFailure]);

impl fmt::Display for CleanupNotes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for failure in self.0 {
            write!(
                f,
                " (cleanup of {} also failed: {})",
                failure.step, failure.message
            )?;
        }
        Ok(())
    }
}

/// Runs one image build.
pub struct Builder {
    request: BuildRequest,
    services: Services,
    pause: Option<Box<dyn PauseHook>>,
    cancel: CancelFlag,
}

impl Builder {
    /// Creates a builder for `request`.
    #[must_use]
    pub fn new(request: BuildRequest, services: Services) -> Self {
        Self {
            request,
            services,
            pause: None,
            cancel: CancelFlag::new(),
        }
    }

    /// Sets the hook used between steps when the request enables debugging.
    #[must_use]
    pub fn with_pause(mut self, pause: Box<dyn PauseHook>) -> Self {
        self.pause = Some(pause);
        self
    }

    /// Returns a handle that cancels this build when raised.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Requests cancellation. Takes effect at the next step boundary or poll
    /// iteration.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Runs the default steps and returns the captured image. Cleanup
    /// notices raised after the image was captured travel with the
    /// [`Artifact`] instead of failing the build.
    ///
    /// # Errors
    ///
    /// Returns [`BuildFailure`] carrying the error that stopped the build and
    /// any cleanup failures, or [`BuildError::MissingArtifact`] when every
    /// step continued without recording an image.
    pub async fn run(self) -> Result<Artifact, BuildFailure> {
        let mut runner = Runner::new(default_steps(&self.request));
        if self.request.debug
            && let Some(pause) = self.pause
        {
            runner = runner.with_pause(pause);
        }

        let mut state = BuildState::new(self.request, self.services, self.cancel);
        let outcome = runner.run(&mut state).await;
        let cleanup_failures = state.take_cleanup_failures();

        if let Err(error) = outcome {
            return Err(BuildFailure {
                error: Box::new(error),
                cleanup_failures,
            });
        }

        let Some(image_name) = state.image_name() else {
            return Err(BuildFailure {
                error: Box::new(BuildError::MissingArtifact),
                cleanup_failures,
            });
        };

        if cleanup_failures.is_empty() {
            info!(image = image_name, "build finished");
        } else {
            warn!(
                image = image_name,
                notices = cleanup_failures.len(),
                "build finished; some resources need manual removal"
            );
        }
        Ok(Artifact::new(
            image_name,
            state.services.compute.clone(),
            state.services.clock.clone(),
        )
        .with_polling(state.request.poll_interval, state.request.state_timeout)
        .with_cleanup_failures(cleanup_failures))
    }
}
