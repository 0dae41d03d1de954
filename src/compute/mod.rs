//! Compute Engine resource access.
//!
//! [`ComputeApi`] is the seam between build steps and the provider. The HTTP
//! implementation lives in [`GceClient`]; tests substitute an in-memory fake.
//! Resolution helpers turn user-facing names into locators and enforce
//! provider rules (deprecated machine types, image fallback project), while
//! [`Poller`] drives long-running operations to completion.

use std::future::Future;
use std::pin::Pin;

mod client;
mod error;
mod resolve;
pub mod types;
pub mod wait;

pub use client::{DEFAULT_API_ENDPOINT, GceClient};
pub use error::ComputeError;
pub use resolve::{resolve_image, resolve_machine_type, resolve_network, resolve_zone};
pub use types::{
    Image, ImageConfig, Instance, InstanceConfig, InstanceStatus, MachineType, Network, Operation,
    OperationName, OperationScope, OperationStatus, SelfLink, Zone,
};
pub use wait::Poller;

/// Boxed future returned by [`ComputeApi`] methods.
pub type ComputeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ComputeError>> + Send + 'a>>;

/// Resource operations against a single project.
///
/// Every method performs exactly one remote call. Mutating calls return the
/// operation record the provider created; callers poll it with [`Poller`].
pub trait ComputeApi: Send + Sync {
    /// Project that owns instances and images created by this client.
    fn project_id(&self) -> &str;

    /// Fetches a zone by name.
    fn get_zone<'a>(&'a self, zone: &'a str) -> ComputeFuture<'a, Zone>;

    /// Lists zones visible to the project.
    fn list_zones(&self) -> ComputeFuture<'_, Vec<Zone>>;

    /// Fetches a machine type in `zone`.
    fn get_machine_type<'a>(&'a self, zone: &'a str, name: &'a str)
    -> ComputeFuture<'a, MachineType>;

    /// Lists machine types offered in `zone`.
    fn list_machine_types<'a>(&'a self, zone: &'a str) -> ComputeFuture<'a, Vec<MachineType>>;

    /// Fetches an image from `project`.
    fn get_image<'a>(&'a self, project: &'a str, name: &'a str) -> ComputeFuture<'a, Image>;

    /// Lists images owned by `project`.
    fn list_images<'a>(&'a self, project: &'a str) -> ComputeFuture<'a, Vec<Image>>;

    /// Fetches a network from the client's project.
    fn get_network<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, Network>;

    /// Starts creating an instance in `zone`.
    fn insert_instance<'a>(
        &'a self,
        zone: &'a str,
        config: &'a InstanceConfig,
    ) -> ComputeFuture<'a, Operation>;

    /// Fetches the observed state of an instance.
    fn get_instance<'a>(&'a self, zone: &'a str, name: &'a str) -> ComputeFuture<'a, Instance>;

    /// Starts deleting an instance.
    fn delete_instance<'a>(&'a self, zone: &'a str, name: &'a str)
    -> ComputeFuture<'a, Operation>;

    /// Starts registering an image from an archive.
    fn insert_image<'a>(&'a self, config: &'a ImageConfig) -> ComputeFuture<'a, Operation>;

    /// Starts deleting an image from the client's project.
    fn delete_image<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, Operation>;

    /// Fetches a zone-scoped operation record.
    fn get_zone_operation<'a>(&'a self, zone: &'a str, name: &'a str)
    -> ComputeFuture<'a, Operation>;

    /// Fetches a project-wide operation record.
    fn get_global_operation<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, Operation>;
}

#[cfg(test)]
mod tests;
