//! Terminal error of a build and advisory cleanup notices.

use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

use crate::compute::ComputeError;
use crate::config::ConfigError;
use crate::credentials::CredentialsError;
use crate::remote::{KeyError, RemoteError};

/// Errors that stop a build. Exactly one is returned per failed run.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Raised when the configuration is incomplete or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when credentials cannot be loaded or no token is available.
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    /// Raised when the login key pair cannot be generated.
    #[error("failed to generate SSH key pair: {0}")]
    KeyGeneration(#[source] KeyError),
    /// Raised when a resource lookup, provider call or wait fails.
    #[error("{action}: {source}")]
    Compute {
        /// What the step was doing.
        action: String,
        /// Underlying client error.
        #[source]
        source: ComputeError,
    },
    /// Raised when deleting the build instance fails.
    #[error("failed to delete instance {instance}: {source}; please destroy it manually")]
    Teardown {
        /// Instance that may have leaked.
        instance: String,
        /// Underlying client error.
        #[source]
        source: ComputeError,
    },
    /// Raised when SSH never becomes reachable.
    #[error("timeout after {waited_secs}s waiting for SSH on {address}")]
    ConnectTimeout {
        /// Address that was checked.
        address: SocketAddr,
        /// Seconds elapsed before giving up.
        waited_secs: u64,
    },
    /// Raised when the remote session cannot be opened or a command cannot
    /// be started.
    #[error("{action}: {source}")]
    Remote {
        /// What the step was doing.
        action: String,
        /// Underlying session error.
        #[source]
        source: RemoteError,
    },
    /// Raised when a command on the instance exits non-zero.
    #[error("{action}: `{command}` exited with status {status}: {stderr}")]
    RemoteCommand {
        /// What the step was doing.
        action: String,
        /// Command that failed.
        command: String,
        /// Exit status or `unknown`.
        status: String,
        /// Trimmed standard error of the command.
        stderr: String,
    },
    /// Raised when the build was cancelled.
    #[error("build cancelled")]
    Cancelled,
    /// Raised when a step reads a value no earlier step wrote.
    #[error("internal error: build state is missing {key}")]
    MissingState {
        /// Name of the missing value.
        key: &'static str,
    },
    /// Raised when a step halts without recording why.
    #[error("internal error: step {step} halted without recording an error")]
    HaltWithoutError {
        /// Step that halted.
        step: &'static str,
    },
    /// Raised when every step continued but no image name was recorded.
    #[error("internal error: build finished without producing an image")]
    MissingArtifact,
}

impl BuildError {
    /// Wraps a client error, turning an observed cancellation into
    /// [`BuildError::Cancelled`].
    #[must_use]
    pub fn compute(action: impl Into<String>, source: ComputeError) -> Self {
        if source == ComputeError::Cancelled {
            return Self::Cancelled;
        }
        Self::Compute {
            action: action.into(),
            source,
        }
    }

    /// Wraps a session error.
    #[must_use]
    pub fn remote(action: impl Into<String>, source: RemoteError) -> Self {
        Self::Remote {
            action: action.into(),
            source,
        }
    }
}

/// Cleanup that failed. Reported alongside the primary error of a failed
/// build, or attached to the artifact when only the instance teardown failed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CleanupFailure {
    /// Step whose cleanup failed.
    pub step: &'static str,
    /// Rendered error.
    pub message: String,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cleanup of {} failed: {}", self.step, self.message)
    }
}
