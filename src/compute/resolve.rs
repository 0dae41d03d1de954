//! Name-to-resource resolution with provider rules applied.

use tracing::{debug, info};

use super::types::{Image, MachineType, Network, Zone};
use super::{ComputeApi, ComputeError};

/// Looks up `zone`.
///
/// # Errors
///
/// Propagates [`ComputeError::NotFound`] and transport failures unchanged.
pub async fn resolve_zone(api: &dyn ComputeApi, zone: &str) -> Result<Zone, ComputeError> {
    api.get_zone(zone).await
}

/// Looks up a machine type and rejects it when it carries a deprecation
/// record in any state other than `ACTIVE`.
///
/// # Errors
///
/// Returns [`ComputeError::MachineTypeUnavailable`] for deprecated, obsolete
/// or deleted types, and propagates lookup failures.
pub async fn resolve_machine_type(
    api: &dyn ComputeApi,
    zone: &str,
    name: &str,
) -> Result<MachineType, ComputeError> {
    let machine_type = api.get_machine_type(zone, name).await?;
    if let Some(deprecation) = machine_type
        .deprecated
        .as_ref()
        .filter(|record| record.is_deprecated())
    {
        return Err(ComputeError::MachineTypeUnavailable {
            name: name.to_owned(),
            zone: zone.to_owned(),
            state: deprecation.state.clone(),
        });
    }
    Ok(machine_type)
}

/// Looks up an image in the client's own project, then in
/// `fallback_project`.
///
/// Only a not-found answer from the first lookup triggers the fallback; any
/// other failure is returned as is.
///
/// # Errors
///
/// Returns [`ComputeError::ImageNotFound`] naming both projects when neither
/// holds the image.
pub async fn resolve_image(
    api: &dyn ComputeApi,
    name: &str,
    fallback_project: &str,
) -> Result<Image, ComputeError> {
    let own_project = api.project_id().to_owned();
    match api.get_image(&own_project, name).await {
        Ok(image) => return Ok(image),
        Err(err) if err.is_not_found() => {
            debug!(image = name, project = %own_project, "image not in own project");
        }
        Err(err) => return Err(err),
    }

    if fallback_project == own_project {
        return Err(ComputeError::ImageNotFound {
            name: name.to_owned(),
            projects: vec![own_project],
        });
    }

    match api.get_image(fallback_project, name).await {
        Ok(image) => {
            info!(image = name, project = fallback_project, "using image from fallback project");
            Ok(image)
        }
        Err(err) if err.is_not_found() => Err(ComputeError::ImageNotFound {
            name: name.to_owned(),
            projects: vec![own_project, fallback_project.to_owned()],
        }),
        Err(err) => Err(err),
    }
}

/// Looks up a network in the client's own project.
///
/// # Errors
///
/// Propagates lookup failures.
pub async fn resolve_network(api: &dyn ComputeApi, name: &str) -> Result<Network, ComputeError> {
    api.get_network(name).await
}
