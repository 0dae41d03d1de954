//! Bundles the instance disk, uploads it and registers it as an image.

use std::sync::Arc;

use tracing::info;

use crate::compute::{ImageConfig, OperationScope, OperationStatus};
use crate::config::BuildRequest;
use crate::pipeline::{BuildError, BuildState, Step, StepAction, StepFuture};

use super::run_checked;

const BUNDLE_DIR: &str = "/tmp";
const BUNDLE_LOG: &str = "/tmp/kiln-bundle.log";

/// Captures the instance's boot disk as a new image.
#[derive(Clone, Copy, Debug, Default)]
pub struct CaptureImage;

impl CaptureImage {
    async fn capture(state: &mut BuildState) -> Result<(), BuildError> {
        let session = state.session()?;
        let request = &state.request;

        info!(image = %request.image_name, "Bundling image...");
        run_checked(session, "Error bundling image", &bundle_command(request)).await?;

        info!(bucket = %request.bucket_name, "Uploading image...");
        run_checked(session, "Error uploading image", &upload_command(request)).await?;

        let compute = Arc::clone(&state.services.compute);
        let config = ImageConfig::new(
            &request.image_name,
            &request.image_description,
            request.archive_source_url(),
        );
        info!(image = %request.image_name, "Creating image...");
        let operation = compute
            .insert_image(&config)
            .await
            .map_err(|err| BuildError::compute("Error creating image", err))?;

        state
            .poller()
            .await_operation(
                OperationStatus::Done,
                &OperationScope::Global,
                operation.name.as_str(),
                request.state_timeout,
            )
            .await
            .map_err(|err| BuildError::compute("Error creating image", err))?;

        let image_name = request.image_name.clone();
        info!(image = %image_name, "Image created");
        state.put_image_name(image_name);
        Ok(())
    }
}

fn bundle_command(request: &BuildRequest) -> String {
    format!(
        "sudo gcimagebundle -d /dev/sda -o {BUNDLE_DIR}/ --output_file_name {} --log_file={BUNDLE_LOG}",
        shell_escape::unix::escape(request.archive_name().into())
    )
}

fn upload_command(request: &BuildRequest) -> String {
    let local = format!("{BUNDLE_DIR}/{}", request.archive_name());
    format!(
        "sudo gsutil cp {} {}",
        shell_escape::unix::escape(local.into()),
        shell_escape::unix::escape(request.archive_upload_url().into())
    )
}

impl Step for CaptureImage {
    fn name(&self) -> &'static str {
        "capture-image"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            match Self::capture(state).await {
                Ok(()) => StepAction::Continue,
                Err(err) => state.halt(err),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::test_support::example_request;

    #[rstest]
    fn commands_reference_archive_and_bucket() {
        let request = example_request();

        assert_eq!(
            bundle_command(&request),
            "sudo gcimagebundle -d /dev/sda -o /tmp/ --output_file_name packer-1234.tar.gz \
             --log_file=/tmp/kiln-bundle.log"
        );
        let upload = upload_command(&request);
        assert!(upload.starts_with("sudo gsutil cp /tmp/packer-1234.tar.gz "));
        assert!(upload.contains("gs://kiln-images/packer-1234.tar.gz"));
        assert_eq!(
            request.archive_source_url(),
            "https://storage.googleapis.com/kiln-images/packer-1234.tar.gz"
        );
    }
}
