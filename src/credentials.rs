//! Service-account identity and access-token sources.
//!
//! kiln never performs the OAuth token exchange itself. It reads the
//! client-secrets file for the service-account identity and asks a
//! [`TokenSource`] for a bearer token once, when the compute client is built.

use std::ffi::OsString;
use std::fmt;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::Deserialize;
use thiserror::Error;

use crate::remote::CommandRunner;

/// Errors raised while loading credentials or fetching a token.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CredentialsError {
    /// Raised when the client-secrets file cannot be read.
    #[error("failed to read client secrets {path}: {message}")]
    Read {
        /// File that could not be read.
        path: String,
        /// Operating system error message.
        message: String,
    },
    /// Raised when the client-secrets file is not valid JSON of the expected
    /// shape.
    #[error("invalid client secrets: {0}")]
    Parse(String),
    /// Raised when the token helper cannot be run or fails.
    #[error("failed to obtain access token via {program}: {message}")]
    Token {
        /// Helper program.
        program: String,
        /// Failure description.
        message: String,
    },
    /// Raised when the token helper prints nothing.
    #[error("{program} returned an empty access token")]
    EmptyToken {
        /// Helper program.
        program: String,
    },
}

/// Service-account identity from the `web` section of a client-secrets file.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct ServiceAccountIdentity {
    /// Principal email of the service account.
    #[serde(default)]
    pub client_email: String,
    /// OAuth client identifier; its prefix before the first `-` is the
    /// project number.
    #[serde(default)]
    pub client_id: String,
    /// Authorization endpoint.
    #[serde(default)]
    pub auth_uri: String,
    /// Token endpoint.
    #[serde(default)]
    pub token_uri: String,
}

/// Parsed client-secrets file.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct ClientSecrets {
    /// Web-application credentials block.
    pub web: ServiceAccountIdentity,
}

impl ClientSecrets {
    /// Reads and parses a client-secrets JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::Read`] when the file is unreadable and
    /// [`CredentialsError::Parse`] when its contents are malformed.
    pub fn load(path: &Utf8Path) -> Result<Self, CredentialsError> {
        let read_error = |message: String| CredentialsError::Read {
            path: path.to_string(),
            message,
        };
        let parent = path
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let file_name = path
            .file_name()
            .ok_or_else(|| read_error(String::from("path has no file name")))?;

        let dir = Dir::open_ambient_dir(parent, ambient_authority())
            .map_err(|err| read_error(err.to_string()))?;
        let contents = dir
            .read_to_string(file_name)
            .map_err(|err| read_error(err.to_string()))?;
        Self::from_json(&contents)
    }

    /// Parses client secrets from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::Parse`] when the JSON is malformed or has
    /// no `web` object.
    pub fn from_json(contents: &str) -> Result<Self, CredentialsError> {
        serde_json::from_str(contents).map_err(|err| CredentialsError::Parse(err.to_string()))
    }

    /// Derives the project identifier from `client_id`.
    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        self.web
            .client_id
            .split('-')
            .next()
            .map(str::trim)
            .filter(|prefix| !prefix.is_empty())
    }
}

/// Source of OAuth bearer tokens.
pub trait TokenSource {
    /// Returns a token valid for the Compute Engine API.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError`] when no token can be produced.
    fn access_token(&self) -> Result<String, CredentialsError>;
}

/// Token supplied directly through configuration.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wraps a pre-issued token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(..)")
    }
}

impl TokenSource for StaticToken {
    fn access_token(&self) -> Result<String, CredentialsError> {
        let token = self.0.trim();
        if token.is_empty() {
            return Err(CredentialsError::EmptyToken {
                program: String::from("configuration"),
            });
        }
        Ok(token.to_owned())
    }
}

/// Token printed by `gcloud auth print-access-token`.
#[derive(Clone, Debug)]
pub struct GcloudToken<R> {
    program: String,
    account: Option<String>,
    runner: R,
}

impl<R: CommandRunner> GcloudToken<R> {
    /// Creates a token source that runs `program` through `runner`.
    #[must_use]
    pub fn new(program: impl Into<String>, runner: R) -> Self {
        Self {
            program: program.into(),
            account: None,
            runner,
        }
    }

    /// Requests a token for a specific account rather than the active one.
    #[must_use]
    pub fn for_account(mut self, account: impl Into<String>) -> Self {
        let value = account.into();
        self.account = (!value.trim().is_empty()).then_some(value);
        self
    }

    fn args(&self) -> Vec<OsString> {
        let mut args = vec![OsString::from("auth"), OsString::from("print-access-token")];
        if let Some(account) = &self.account {
            args.push(OsString::from(account));
        }
        args
    }
}

impl<R: CommandRunner> TokenSource for GcloudToken<R> {
    fn access_token(&self) -> Result<String, CredentialsError> {
        let output = self
            .runner
            .run(&self.program, &self.args())
            .map_err(|err| CredentialsError::Token {
                program: self.program.clone(),
                message: err.to_string(),
            })?;

        if !output.is_success() {
            return Err(CredentialsError::Token {
                program: self.program.clone(),
                message: output.stderr.trim().to_owned(),
            });
        }

        let token = output.stdout.trim();
        if token.is_empty() {
            return Err(CredentialsError::EmptyToken {
                program: self.program.clone(),
            });
        }
        Ok(token.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8PathBuf;
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;
    use crate::test_support::ScriptedRunner;

    const SECRETS: &str = r#"{
        "web": {
            "client_email": "builder@kiln-project.iam.gserviceaccount.com",
            "client_id": "123456789-abcdef.apps.googleusercontent.com",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token"
        }
    }"#;

    #[rstest]
    fn project_id_is_client_id_prefix() {
        let secrets = ClientSecrets::from_json(SECRETS).unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(secrets.project_id(), Some("123456789"));
        assert_eq!(
            secrets.web.client_email,
            "builder@kiln-project.iam.gserviceaccount.com"
        );
    }

    #[rstest]
    fn missing_web_block_is_a_parse_error() {
        let result = ClientSecrets::from_json(r#"{"installed": {}}"#);
        assert!(matches!(result, Err(CredentialsError::Parse(_))));
    }

    #[rstest]
    fn empty_client_id_yields_no_project() {
        let secrets = ClientSecrets::from_json(r#"{"web": {}}"#)
            .unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(secrets.project_id(), None);
    }

    #[rstest]
    fn load_reads_file_from_disk() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = Utf8PathBuf::from_path_buf(tmp.path().join("secrets.json"))
            .unwrap_or_else(|path| panic!("non-utf8 path: {}", path.display()));
        fs::write(&path, SECRETS).unwrap_or_else(|err| panic!("write: {err}"));

        let secrets = ClientSecrets::load(&path).unwrap_or_else(|err| panic!("{err}"));

        assert_eq!(secrets.project_id(), Some("123456789"));
    }

    #[rstest]
    fn load_reports_missing_file() {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = Utf8PathBuf::from_path_buf(tmp.path().join("absent.json"))
            .unwrap_or_else(|path| panic!("non-utf8 path: {}", path.display()));

        let result = ClientSecrets::load(&path);

        assert!(matches!(result, Err(CredentialsError::Read { .. })));
    }

    #[rstest]
    fn gcloud_token_passes_account_and_trims_output() {
        let runner = ScriptedRunner::new();
        runner.push_output(Some(0), "ya29.token\n", "");
        let source = GcloudToken::new("gcloud", runner.clone()).for_account("builder@example.com");

        let token = source.access_token().unwrap_or_else(|err| panic!("{err}"));

        assert_eq!(token, "ya29.token");
        let invocations = runner.invocations();
        let invocation = invocations
            .first()
            .unwrap_or_else(|| panic!("gcloud was not invoked"));
        assert_eq!(invocation.program, "gcloud");
        assert_eq!(
            invocation.args_lossy(),
            vec!["auth", "print-access-token", "builder@example.com"]
        );
    }

    #[rstest]
    fn gcloud_failure_surfaces_stderr() {
        let runner = ScriptedRunner::new();
        runner.push_output(Some(1), "", "not logged in\n");
        let source = GcloudToken::new("gcloud", runner);

        let err = source
            .access_token()
            .err()
            .unwrap_or_else(|| panic!("expected failure"));

        assert_eq!(
            err,
            CredentialsError::Token {
                program: String::from("gcloud"),
                message: String::from("not logged in"),
            }
        );
    }

    #[rstest]
    fn blank_static_token_is_rejected() {
        assert!(StaticToken::new("  ").access_token().is_err());
        assert_eq!(
            StaticToken::new(" abc ").access_token().ok().as_deref(),
            Some("abc")
        );
    }
}
