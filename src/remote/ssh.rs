//! SSH-backed [`Connector`] built on the system `ssh` client.

use std::ffi::OsString;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::{
    CommandRunner, Connector, ReachableFuture, RemoteCommandOutput, RemoteError, RemoteFuture,
    RemoteSession, SessionTarget,
};

/// Client-side SSH options shared by every session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshSettings {
    /// Path or name of the `ssh` executable.
    pub ssh_bin: String,
    /// Timeout for a single TCP reachability check and for `ssh`'s own connect phase.
    pub connect_timeout: Duration,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            ssh_bin: String::from("ssh"),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl SshSettings {
    pub(crate) fn build_args(&self, target: &SessionTarget, command: &str) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(target.address.port().to_string()),
        ];

        if let Some(identity) = target.key.identity_file.as_ref() {
            args.push(OsString::from("-i"));
            args.push(OsString::from(identity.as_str()));
        }

        for option in [
            String::from("BatchMode=yes"),
            String::from("StrictHostKeyChecking=no"),
            String::from("UserKnownHostsFile=/dev/null"),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            String::from("IdentitiesOnly=yes"),
            String::from("LogLevel=ERROR"),
        ] {
            args.push(OsString::from("-o"));
            args.push(OsString::from(option));
        }

        args.push(OsString::from(format!(
            "{}@{}",
            target.username,
            target.address.ip()
        )));
        args.push(OsString::from(command));
        args
    }
}

/// Opens [`SshSession`]s that run commands through `R`.
#[derive(Clone, Debug)]
pub struct SshConnector<R> {
    settings: SshSettings,
    runner: Arc<R>,
}

impl<R: CommandRunner> SshConnector<R> {
    /// Creates a connector using `runner` to spawn the SSH client.
    #[must_use]
    pub fn new(settings: SshSettings, runner: R) -> Self {
        Self {
            settings,
            runner: Arc::new(runner),
        }
    }

    /// Returns the configured client settings.
    #[must_use]
    pub const fn settings(&self) -> &SshSettings {
        &self.settings
    }
}

impl<R: CommandRunner + 'static> Connector for SshConnector<R> {
    fn is_reachable(&self, address: SocketAddr) -> ReachableFuture<'_> {
        Box::pin(async move {
            let attempt = timeout(self.settings.connect_timeout, TcpStream::connect(address)).await;
            let reachable = matches!(attempt, Ok(Ok(_)));
            debug!(%address, reachable, "checked SSH port");
            reachable
        })
    }

    fn open(&self, target: &SessionTarget) -> Result<Box<dyn RemoteSession>, RemoteError> {
        if target.key.identity_file.is_none() {
            return Err(RemoteError::MissingIdentity);
        }
        Ok(Box::new(SshSession {
            settings: self.settings.clone(),
            runner: Arc::clone(&self.runner),
            target: target.clone(),
        }))
    }
}

/// Session that spawns one `ssh` process per command.
#[derive(Debug)]
pub struct SshSession<R> {
    settings: SshSettings,
    runner: Arc<R>,
    target: SessionTarget,
}

impl<R> SshSession<R> {
    /// Returns the host this session talks to.
    #[must_use]
    pub const fn target(&self) -> &SessionTarget {
        &self.target
    }
}

impl<R: CommandRunner + 'static> RemoteSession for SshSession<R> {
    fn run<'a>(&'a self, command: &'a str) -> RemoteFuture<'a, RemoteCommandOutput> {
        Box::pin(async move {
            let args = self.settings.build_args(&self.target, command);
            let program = self.settings.ssh_bin.clone();
            let runner = Arc::clone(&self.runner);
            debug!(host = %self.target.address, command, "running remote command");
            let output = tokio::task::spawn_blocking(move || runner.run(&program, &args))
                .await
                .map_err(|err| RemoteError::Io {
                    message: format!("remote command task failed: {err}"),
                })??;
            Ok(RemoteCommandOutput::from(output))
        })
    }
}
