//! Concrete build steps and the default step order.

use crate::config::BuildRequest;
use crate::remote::{RemoteCommandOutput, RemoteSession};

use super::{BuildError, Step};

mod await_ready;
mod capture_image;
mod connect;
mod create_credentials;
mod create_instance;
mod provision;
mod refresh_gsutil;
mod teardown_instance;

pub use await_ready::AwaitInstanceReady;
pub use capture_image::CaptureImage;
pub use connect::Connect;
pub use create_credentials::CreateCredentials;
pub use create_instance::CreateInstance;
pub use provision::Provision;
pub use refresh_gsutil::RefreshGsutil;
pub use teardown_instance::TeardownInstance;

/// Builds the standard pipeline for `request`.
#[must_use]
pub fn default_steps(request: &BuildRequest) -> Vec<Box<dyn Step>> {
    let mut steps: Vec<Box<dyn Step>> = vec![
        Box::new(CreateCredentials),
        Box::new(CreateInstance::default()),
        Box::new(AwaitInstanceReady),
        Box::new(Connect),
        Box::new(Provision),
    ];
    if request.update_gsutil {
        steps.push(Box::new(RefreshGsutil));
    }
    steps.push(Box::new(CaptureImage));
    steps.push(Box::new(TeardownInstance));
    steps
}

/// Runs `command` and turns a spawn failure or non-zero exit into a
/// [`BuildError`] describing `action`.
pub(crate) async fn run_checked(
    session: &dyn RemoteSession,
    action: &str,
    command: &str,
) -> Result<RemoteCommandOutput, BuildError> {
    let output = session
        .run(command)
        .await
        .map_err(|err| BuildError::remote(action, err))?;
    if output.is_success() {
        return Ok(output);
    }
    Err(BuildError::RemoteCommand {
        action: action.to_owned(),
        command: command.to_owned(),
        status: output.status_text(),
        stderr: output.stderr.trim().to_owned(),
    })
}
