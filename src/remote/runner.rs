//! Local process execution used by the SSH session and key generator.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::thread;

use super::RemoteError;

/// Result of running an external command.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError>;
}

/// Command runner that captures output without echoing it.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| spawn_error(program, &err))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Command runner that forwards output to the local terminal as it arrives
/// while still capturing it.
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamingCommandRunner;

impl CommandRunner for StreamingCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, RemoteError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| spawn_error(program, &err))?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let stdout_thread = thread::spawn(move || tee(stdout_pipe, io::stdout()));
        let stderr_thread = thread::spawn(move || tee(stderr_pipe, io::stderr()));

        let status = child.wait().map_err(|err| RemoteError::Io {
            message: format!("failed to wait for {program}: {err}"),
        })?;

        let stdout = join_capture(stdout_thread)?;
        let stderr = join_capture(stderr_thread)?;

        Ok(CommandOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}

fn tee<R: Read, W: Write>(source: Option<R>, mut sink: W) -> io::Result<String> {
    let Some(mut reader) = source else {
        return Ok(String::new());
    };

    let mut captured = Vec::new();
    let mut buffer = [0_u8; 8192];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        let chunk = buffer.get(..read).unwrap_or_default();
        captured.extend_from_slice(chunk);
        sink.write_all(chunk)?;
        sink.flush()?;
    }

    Ok(String::from_utf8_lossy(&captured).into_owned())
}

fn join_capture(handle: thread::JoinHandle<io::Result<String>>) -> Result<String, RemoteError> {
    handle
        .join()
        .map_err(|_| RemoteError::Io {
            message: String::from("output forwarding thread panicked"),
        })?
        .map_err(|err| RemoteError::Io {
            message: err.to_string(),
        })
}

fn spawn_error(program: &str, err: &io::Error) -> RemoteError {
    RemoteError::Spawn {
        program: program.to_owned(),
        message: err.to_string(),
    }
}
