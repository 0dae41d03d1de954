//! Ephemeral SSH key pairs for logging into the build instance.

use std::ffi::OsString;
use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use tempfile::TempDir;
use thiserror::Error;

use super::CommandRunner;

const KEY_FILE_NAME: &str = "kiln_key";
const KEY_COMMENT: &str = "kiln";

/// Login key pair generated for a single build.
///
/// When produced by [`SshKeygen`] the private key also lives in a temporary
/// directory that is removed once the last clone of the pair is dropped.
#[derive(Clone)]
pub struct SshKeyPair {
    /// PEM-encoded private key.
    pub private_key: String,
    /// Public key in `authorized_keys` format.
    pub public_key: String,
    /// On-disk private key usable with `ssh -i`, when one exists.
    pub identity_file: Option<Utf8PathBuf>,
    _workspace: Option<Arc<TempDir>>,
}

impl SshKeyPair {
    /// Builds a key pair that only exists in memory.
    #[must_use]
    pub fn in_memory(private_key: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            private_key: private_key.into(),
            public_key: public_key.into(),
            identity_file: None,
            _workspace: None,
        }
    }

    /// Points the pair at an existing identity file.
    #[must_use]
    pub fn with_identity_file(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Formats the `ssh-keys` metadata value that authorises this key for
    /// `username`.
    #[must_use]
    pub fn authorized_key_entry(&self, username: &str) -> String {
        format!("{username}:{}", self.public_key.trim())
    }
}

impl fmt::Debug for SshKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshKeyPair")
            .field("public_key", &self.public_key)
            .field("identity_file", &self.identity_file)
            .finish_non_exhaustive()
    }
}

/// Errors raised while generating a key pair.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum KeyError {
    /// Raised when the scratch directory cannot be prepared.
    #[error("failed to prepare key directory: {message}")]
    Workspace {
        /// Description of the failure.
        message: String,
    },
    /// Raised when `ssh-keygen` cannot be started.
    #[error("failed to run {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error message.
        message: String,
    },
    /// Raised when `ssh-keygen` exits non-zero.
    #[error("{program} exited with status {status}: {stderr}")]
    Failed {
        /// Program that failed.
        program: String,
        /// Exit status or `unknown`.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
    /// Raised when the generated key files cannot be read back.
    #[error("failed to read generated key {path}: {message}")]
    Read {
        /// File that could not be read.
        path: Utf8PathBuf,
        /// Operating system error message.
        message: String,
    },
}

/// Source of fresh key pairs.
pub trait KeyGenerator: Send + Sync {
    /// Generates a new key pair.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] when generation fails.
    fn generate(&self) -> Result<SshKeyPair, KeyError>;
}

/// Generates RSA key pairs by invoking `ssh-keygen`.
#[derive(Clone, Debug)]
pub struct SshKeygen<R> {
    program: String,
    runner: R,
}

impl<R: CommandRunner> SshKeygen<R> {
    /// Creates a generator that runs `program` through `runner`.
    #[must_use]
    pub fn new(program: impl Into<String>, runner: R) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }
}

impl<R: CommandRunner> KeyGenerator for SshKeygen<R> {
    fn generate(&self) -> Result<SshKeyPair, KeyError> {
        let workspace = TempDir::new().map_err(|err| KeyError::Workspace {
            message: err.to_string(),
        })?;
        let dir_path = Utf8PathBuf::from_path_buf(workspace.path().to_path_buf()).map_err(
            |path| KeyError::Workspace {
                message: format!("temporary directory is not UTF-8: {}", path.display()),
            },
        )?;
        let key_path = dir_path.join(KEY_FILE_NAME);

        let args = [
            "-q", "-t", "rsa", "-b", "2048", "-N", "", "-C", KEY_COMMENT, "-f",
        ]
        .into_iter()
        .map(OsString::from)
        .chain(std::iter::once(OsString::from(key_path.as_str())))
        .collect::<Vec<_>>();

        let output = self
            .runner
            .run(&self.program, &args)
            .map_err(|err| KeyError::Spawn {
                program: self.program.clone(),
                message: err.to_string(),
            })?;
        if !output.is_success() {
            return Err(KeyError::Failed {
                program: self.program.clone(),
                status: output
                    .code
                    .map_or_else(|| String::from("unknown"), |code| code.to_string()),
                stderr: output.stderr.trim().to_owned(),
            });
        }

        let private_key = read_key(&dir_path, KEY_FILE_NAME)?;
        let public_key = read_key(&dir_path, &format!("{KEY_FILE_NAME}.pub"))?;

        Ok(SshKeyPair {
            private_key,
            public_key: public_key.trim().to_owned(),
            identity_file: Some(key_path),
            _workspace: Some(Arc::new(workspace)),
        })
    }
}

fn read_key(dir_path: &Utf8Path, file_name: &str) -> Result<String, KeyError> {
    let read_error = |message: String| KeyError::Read {
        path: dir_path.join(file_name),
        message,
    };
    let dir = Dir::open_ambient_dir(dir_path, ambient_authority())
        .map_err(|err| read_error(err.to_string()))?;
    dir.read_to_string(file_name)
        .map_err(|err| read_error(err.to_string()))
}
