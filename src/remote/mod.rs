//! Remote access to the build instance.
//!
//! The pipeline only needs two things from a remote session: "is this address
//! reachable yet" and "run this command". [`Connector`] and [`RemoteSession`]
//! expose exactly that; [`SshConnector`] implements them by shelling out to
//! the system `ssh` client through a [`CommandRunner`]. Ephemeral login keys
//! come from a [`KeyGenerator`].

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use thiserror::Error;

mod keygen;
mod runner;
mod ssh;

pub use keygen::{KeyError, KeyGenerator, SshKeyPair, SshKeygen};
pub use runner::{CommandOutput, CommandRunner, ProcessCommandRunner, StreamingCommandRunner};
pub use ssh::{SshConnector, SshSession, SshSettings};

/// Boxed future returned by [`RemoteSession::run`].
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Boxed future returned by [`Connector::is_reachable`].
pub type ReachableFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// Output of a command executed on the remote host.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RemoteCommandOutput {
    /// Exit code reported by the remote command, if available.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl RemoteCommandOutput {
    /// Returns `true` when the remote command exited with status zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    /// Renders the exit status for error messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.exit_code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

impl From<CommandOutput> for RemoteCommandOutput {
    fn from(value: CommandOutput) -> Self {
        Self {
            exit_code: value.code,
            stdout: value.stdout,
            stderr: value.stderr,
        }
    }
}

/// Where and as whom to open a session.
#[derive(Clone, Debug)]
pub struct SessionTarget {
    /// Address and port of the SSH daemon.
    pub address: SocketAddr,
    /// Login username.
    pub username: String,
    /// Key pair whose public half was installed on the instance.
    pub key: SshKeyPair,
}

/// Open command channel to a remote host.
pub trait RemoteSession: Send + Sync {
    /// Runs `command` through the remote login shell and waits for it to
    /// exit. A non-zero exit is reported in the output, not as an error.
    fn run<'a>(&'a self, command: &'a str) -> RemoteFuture<'a, RemoteCommandOutput>;
}

/// Factory for remote sessions.
pub trait Connector: Send + Sync {
    /// Returns `true` once `address` accepts connections.
    fn is_reachable(&self, address: SocketAddr) -> ReachableFuture<'_>;

    /// Opens a session to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::MissingIdentity`] when the key pair has no
    /// on-disk identity file the client can use.
    fn open(&self, target: &SessionTarget) -> Result<Box<dyn RemoteSession>, RemoteError>;
}

/// Errors raised while talking to the remote host.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RemoteError {
    /// Raised when a local helper program cannot be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error message.
        message: String,
    },
    /// Raised when local I/O around a command fails.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the failure.
        message: String,
    },
    /// Raised when the key pair cannot be handed to the SSH client.
    #[error("key pair has no identity file on disk")]
    MissingIdentity,
}

#[cfg(test)]
mod tests;
