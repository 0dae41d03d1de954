//! Core library for the kiln image builder.
//!
//! kiln provisions a disposable Google Compute Engine instance, connects to
//! it over SSH, runs provisioning commands, captures its disk as a reusable
//! image and tears the instance down again. The work is expressed as an
//! ordered pipeline of steps sharing a typed build state; a halting step
//! triggers reverse-order cleanup of every step that already completed.

pub mod artifact;
pub mod builder;
pub mod cancel;
pub mod clock;
pub mod compute;
pub mod config;
pub mod credentials;
pub mod pipeline;
pub mod remote;
pub mod test_support;

pub use artifact::{Artifact, BUILDER_ID};
pub use builder::{BuildFailure, Builder};
pub use cancel::CancelFlag;
pub use clock::{Clock, TokioClock};
pub use compute::{ComputeApi, ComputeError, GceClient, Poller};
pub use config::{BuildConfig, BuildRequest, BuildRequestBuilder, ConfigError};
pub use credentials::{ClientSecrets, CredentialsError, GcloudToken, StaticToken, TokenSource};
pub use pipeline::{
    BuildError, BuildState, CleanupFailure, PauseHook, Runner, Services, Step, StepAction,
};
pub use remote::{
    CommandOutput, CommandRunner, Connector, KeyError, KeyGenerator, ProcessCommandRunner,
    RemoteCommandOutput, RemoteError, RemoteSession, SessionTarget, SshConnector, SshKeyPair,
    SshKeygen, SshSettings, StreamingCommandRunner,
};
