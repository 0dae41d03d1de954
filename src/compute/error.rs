//! Error types for the Compute Engine client.

use thiserror::Error;

use super::types::{InstanceStatus, OperationErrorDetail, ResourceKind};

/// Errors raised by the Compute Engine client and its wait helpers.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ComputeError {
    /// Raised when a named resource does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of resource that was looked up.
        kind: ResourceKind,
        /// Name used for the lookup.
        name: String,
    },
    /// Raised when the machine type exists but is being retired.
    #[error("machine type '{name}' in zone {zone} is {state} and cannot be used")]
    MachineTypeUnavailable {
        /// Requested machine type.
        name: String,
        /// Zone used for the lookup.
        zone: String,
        /// Deprecation state reported by the provider.
        state: String,
    },
    /// Raised when the image is absent from every searched project.
    #[error("image '{name}' not found in projects {}", .projects.join(", "))]
    ImageNotFound {
        /// Requested image name.
        name: String,
        /// Projects searched, in order.
        projects: Vec<String>,
    },
    /// Raised when the request never produced an HTTP response.
    #[error("transport error: {message}")]
    Transport {
        /// Message from the HTTP client.
        message: String,
    },
    /// Raised when a success response carries a body that cannot be decoded.
    #[error("invalid response body: {message}")]
    Decode {
        /// Message from the JSON decoder.
        message: String,
    },
    /// Raised when the API answered with a non-success status.
    #[error("API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the error body.
        message: String,
    },
    /// Raised when an operation finishes with a non-empty error payload.
    #[error("operation {operation} failed: {}", describe(.errors))]
    OperationFailed {
        /// Operation name.
        operation: String,
        /// Errors reported by the provider.
        errors: Vec<OperationErrorDetail>,
    },
    /// Raised when a wait exceeds its deadline.
    #[error("timeout after {waited_secs}s waiting for {subject} to reach {target}")]
    Timeout {
        /// Resource being waited on.
        subject: String,
        /// State the wait was targeting.
        target: String,
        /// Seconds elapsed before giving up.
        waited_secs: u64,
    },
    /// Raised when an instance enters a state it cannot leave on its own.
    #[error("instance {instance} entered state {status} while waiting for {target}")]
    UnexpectedInstanceState {
        /// Instance name.
        instance: String,
        /// Observed status.
        status: InstanceStatus,
        /// Status the wait was targeting.
        target: InstanceStatus,
    },
    /// Raised when a running instance exposes no external address.
    #[error("instance {instance} has no external NAT address")]
    MissingNatIp {
        /// Instance name.
        instance: String,
    },
    /// Raised when a wait observes the cancellation flag.
    #[error("cancelled")]
    Cancelled,
}

impl ComputeError {
    /// Returns `true` for lookups that found nothing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<reqwest::Error> for ComputeError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport {
            message: value.to_string(),
        }
    }
}

fn describe(errors: &[OperationErrorDetail]) -> String {
    errors
        .iter()
        .map(|detail| format!("{}: {}", detail.code, detail.message))
        .collect::<Vec<_>>()
        .join("; ")
}
