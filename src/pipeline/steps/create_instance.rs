//! Resolves the configured resources and submits the instance insert.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::compute::types::{
    AttachedDisk, InitializeParams, Metadata, NetworkInterfaceConfig, ServiceAccount, Tags,
};
use crate::compute::{
    Image, InstanceConfig, MachineType, Network, OperationScope, OperationStatus, resolve_image,
    resolve_machine_type, resolve_network, resolve_zone,
};
use crate::config::{BuildRequest, SSH_KEYS_METADATA_KEY};
use crate::pipeline::{BuildError, BuildState, Step, StepAction, StepFuture};
use crate::remote::SshKeyPair;

const INSTANCE_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/compute",
    "https://www.googleapis.com/auth/devstorage.full_control",
];

/// Creates the build instance. Remembers the instance name so cleanup can
/// delete it.
#[derive(Clone, Debug, Default)]
pub struct CreateInstance {
    instance_name: Option<String>,
}

impl CreateInstance {
    /// Name of the instance this step created, if any.
    #[must_use]
    pub fn instance_name(&self) -> Option<&str> {
        self.instance_name.as_deref()
    }

    async fn create(&mut self, state: &mut BuildState) -> Result<(), BuildError> {
        let compute = Arc::clone(&state.services.compute);
        let request = &state.request;

        let zone = resolve_zone(compute.as_ref(), &request.zone)
            .await
            .map_err(|err| BuildError::compute("Error resolving zone", err))?;
        let image = resolve_image(
            compute.as_ref(),
            &request.source_image,
            &request.fallback_image_project,
        )
        .await
        .map_err(|err| BuildError::compute("Error resolving source image", err))?;
        let machine_type = resolve_machine_type(compute.as_ref(), &zone.name, &request.machine_type)
            .await
            .map_err(|err| BuildError::compute("Error resolving machine type", err))?;
        let network = resolve_network(compute.as_ref(), &request.network)
            .await
            .map_err(|err| BuildError::compute("Error resolving network", err))?;

        let name = format!("kiln-{}", Uuid::new_v4().simple());
        let config = instance_config(
            request,
            &name,
            &Resolved {
                image: &image,
                machine_type: &machine_type,
                network: &network,
            },
            state.ssh_key()?,
        );

        info!(instance = %name, zone = %zone.name, "Creating instance...");
        let operation = compute
            .insert_instance(&zone.name, &config)
            .await
            .map_err(|err| BuildError::compute("Error creating instance", err))?;

        self.instance_name = Some(name.clone());
        state.put_instance_name(name);
        state.put_creation_operation(operation.name);
        Ok(())
    }

    async fn delete(&self, state: &BuildState) -> Result<(), BuildError> {
        match self.instance_name.as_deref() {
            Some(name) => delete_instance(state, name).await,
            None => Ok(()),
        }
    }
}

/// Deletes `name` and waits for the deletion to finish. An instance that is
/// already gone counts as deleted. Polling ignores cancellation.
pub(super) async fn delete_instance(state: &BuildState, name: &str) -> Result<(), BuildError> {
    let teardown = |source| BuildError::Teardown {
        instance: name.to_owned(),
        source,
    };
    let zone = state.request.zone.as_str();

    info!(instance = name, "Deleting instance...");
    let operation = match state.services.compute.delete_instance(zone, name).await {
        Ok(operation) => operation,
        Err(err) if err.is_not_found() => {
            warn!(instance = name, "instance already gone");
            return Ok(());
        }
        Err(err) => return Err(teardown(err)),
    };

    state
        .cleanup_poller()
        .await_operation(
            OperationStatus::Done,
            &OperationScope::Zone(zone.to_owned()),
            operation.name.as_str(),
            state.request.state_timeout,
        )
        .await
        .map_err(teardown)?;
    info!(instance = name, "Instance has been deleted");
    Ok(())
}

impl Step for CreateInstance {
    fn name(&self) -> &'static str {
        "create-instance"
    }

    fn run<'a>(&'a mut self, state: &'a mut BuildState) -> StepFuture<'a, StepAction> {
        Box::pin(async move {
            match self.create(state).await {
                Ok(()) => StepAction::Continue,
                Err(err) => state.halt(err),
            }
        })
    }

    fn cleanup<'a>(
        &'a mut self,
        state: &'a mut BuildState,
    ) -> StepFuture<'a, Result<(), BuildError>> {
        Box::pin(async move { self.delete(state).await })
    }
}

struct Resolved<'a> {
    image: &'a Image,
    machine_type: &'a MachineType,
    network: &'a Network,
}

fn instance_config(
    request: &BuildRequest,
    name: &str,
    resolved: &Resolved<'_>,
    key: &SshKeyPair,
) -> InstanceConfig {
    let mut metadata = Metadata::default();
    metadata.push(
        SSH_KEYS_METADATA_KEY,
        key.authorized_key_entry(&request.ssh_username),
    );
    for (key_name, value) in &request.metadata {
        metadata.push(key_name.as_str(), value.as_str());
    }

    InstanceConfig {
        name: name.to_owned(),
        description: String::from("kiln build instance"),
        machine_type: resolved.machine_type.self_link.clone(),
        disks: vec![AttachedDisk {
            boot: true,
            auto_delete: true,
            initialize_params: InitializeParams {
                source_image: resolved.image.self_link.clone(),
            },
        }],
        network_interfaces: vec![NetworkInterfaceConfig::new(resolved.network, true)],
        metadata,
        service_accounts: vec![ServiceAccount {
            email: String::from("default"),
            scopes: INSTANCE_SCOPES.iter().map(|scope| (*scope).to_owned()).collect(),
        }],
        tags: Tags {
            items: request.tags.clone(),
        },
    }
}
