//! Resource models exchanged with the Compute Engine API.
//!
//! Read models mirror the JSON returned by the API (camelCase field names);
//! insert payloads are serialised into request bodies. Newtypes keep resolved
//! locators and operation names from being confused with plain names.

use std::fmt;
use std::net::IpAddr;
use std::ops::Deref;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Returns the wrapped value.
            #[must_use]
            pub const fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

newtype!(
    /// Fully-qualified resource locator (`selfLink`) of a resolved resource.
    SelfLink
);
newtype!(
    /// Provider-assigned name of a long-running operation.
    OperationName
);

/// Kinds of resource the client can look up; used in not-found errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceKind {
    /// An availability zone.
    Zone,
    /// A machine type within a zone.
    MachineType,
    /// A disk image.
    Image,
    /// A VPC network.
    Network,
    /// A virtual machine instance.
    Instance,
    /// A long-running operation record.
    Operation,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Zone => "zone",
            Self::MachineType => "machine type",
            Self::Image => "image",
            Self::Network => "network",
            Self::Instance => "instance",
            Self::Operation => "operation",
        };
        f.write_str(label)
    }
}

/// Availability zone.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    /// Zone name, for example `us-central1-a`.
    pub name: String,
    /// Fully-qualified locator.
    pub self_link: SelfLink,
    /// Reported zone status (`UP` or `DOWN`).
    #[serde(default)]
    pub status: Option<String>,
}

/// Deprecation record attached to machine types and images.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deprecation {
    /// `ACTIVE`, `DEPRECATED`, `OBSOLETE` or `DELETED`.
    #[serde(default)]
    pub state: String,
    /// Suggested replacement resource, when the provider names one.
    #[serde(default)]
    pub replacement: Option<String>,
}

impl Deprecation {
    /// Returns `true` unless the record explicitly reports `ACTIVE`.
    #[must_use]
    pub fn is_deprecated(&self) -> bool {
        !self.state.eq_ignore_ascii_case("ACTIVE")
    }
}

/// Machine type available in a zone.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineType {
    /// Machine type name, for example `n1-standard-1`.
    pub name: String,
    /// Fully-qualified locator.
    pub self_link: SelfLink,
    /// Deprecation record, present only when the type is being retired.
    #[serde(default)]
    pub deprecated: Option<Deprecation>,
}

/// Disk image.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Image name.
    pub name: String,
    /// Fully-qualified locator.
    pub self_link: SelfLink,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Deprecation record, if any.
    #[serde(default)]
    pub deprecated: Option<Deprecation>,
}

/// VPC network.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// Network name.
    pub name: String,
    /// Fully-qualified locator.
    pub self_link: SelfLink,
}

/// Lifecycle states reported for an instance.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Resources are being allocated.
    Provisioning,
    /// Resources are acquired and the instance is preparing to boot.
    Staging,
    /// The instance is booting or running.
    Running,
    /// The instance is being stopped.
    Stopping,
    /// The instance is stopped.
    Stopped,
    /// The instance is being suspended.
    Suspending,
    /// The instance is suspended.
    Suspended,
    /// The instance is being repaired by the provider.
    Repairing,
    /// The instance has shut down.
    Terminated,
    /// A status this client does not recognise.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Provisioning => "PROVISIONING",
            Self::Staging => "STAGING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Suspending => "SUSPENDING",
            Self::Suspended => "SUSPENDED",
            Self::Repairing => "REPAIRING",
            Self::Terminated => "TERMINATED",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

/// External access configuration reported on a network interface.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AccessConfigStatus {
    /// External NAT address, once assigned.
    #[serde(default, rename = "natIP")]
    pub nat_ip: Option<String>,
}

/// Network interface reported on an instance.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceStatus {
    /// Internal address.
    #[serde(default, rename = "networkIP")]
    pub network_ip: Option<String>,
    /// External access configurations.
    #[serde(default)]
    pub access_configs: Vec<AccessConfigStatus>,
}

/// Observed state of an instance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Instance name.
    pub name: String,
    /// Current lifecycle status.
    pub status: InstanceStatus,
    /// Attached network interfaces.
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterfaceStatus>,
}

impl Instance {
    /// Returns the first external NAT address that parses as an IP.
    #[must_use]
    pub fn nat_ip(&self) -> Option<IpAddr> {
        self.network_interfaces
            .iter()
            .flat_map(|interface| interface.access_configs.iter())
            .filter_map(|config| config.nat_ip.as_deref())
            .find_map(|raw| IpAddr::from_str(raw).ok())
    }
}

/// Status of a long-running operation. Variants are ordered; the provider
/// never moves an operation backwards.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    /// Accepted but not started.
    Pending,
    /// In progress.
    Running,
    /// Finished, successfully or not.
    Done,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
        };
        f.write_str(label)
    }
}

/// One entry of an operation's error payload.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct OperationErrorDetail {
    /// Provider error code, for example `QUOTA_EXCEEDED`.
    #[serde(default)]
    pub code: String,
    /// Human readable message.
    #[serde(default)]
    pub message: String,
    /// Field or resource the error refers to.
    #[serde(default)]
    pub location: Option<String>,
}

/// Error payload attached to a finished operation.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct OperationErrorPayload {
    /// Individual errors.
    #[serde(default)]
    pub errors: Vec<OperationErrorDetail>,
}

/// Long-running operation record.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Operation name.
    pub name: OperationName,
    /// Current status.
    pub status: OperationStatus,
    /// Locator of the resource the operation acts on.
    #[serde(default)]
    pub target_link: Option<String>,
    /// Error payload; only meaningful once the operation is `DONE`.
    #[serde(default)]
    pub error: Option<OperationErrorPayload>,
}

impl Operation {
    /// Creates an operation record without an error payload.
    #[must_use]
    pub fn new(name: impl Into<OperationName>, status: OperationStatus) -> Self {
        Self {
            name: name.into(),
            status,
            target_link: None,
            error: None,
        }
    }

    /// Appends an entry to the error payload.
    #[must_use]
    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error
            .get_or_insert_with(OperationErrorPayload::default)
            .errors
            .push(OperationErrorDetail {
                code: code.into(),
                message: message.into(),
                location: None,
            });
        self
    }

    /// Returns the reported errors when the payload is non-empty.
    #[must_use]
    pub fn failure(&self) -> Option<&[OperationErrorDetail]> {
        self.error
            .as_ref()
            .map(|payload| payload.errors.as_slice())
            .filter(|errors| !errors.is_empty())
    }
}

/// Where an operation record lives.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OperationScope {
    /// Zone-scoped operation (instance insert/delete).
    Zone(String),
    /// Project-wide operation (image insert/delete).
    Global,
}

impl fmt::Display for OperationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zone(zone) => write!(f, "zone {zone}"),
            Self::Global => f.write_str("global"),
        }
    }
}

/// Boot disk initialisation parameters.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Locator of the source image.
    pub source_image: SelfLink,
}

/// Disk attached at instance creation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDisk {
    /// Whether this is the boot disk.
    pub boot: bool,
    /// Whether the disk is deleted along with the instance.
    pub auto_delete: bool,
    /// Parameters for the new disk.
    pub initialize_params: InitializeParams,
}

/// External access configuration requested for an interface.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct AccessConfig {
    /// Display name of the access config.
    pub name: String,
    /// Access type; always `ONE_TO_ONE_NAT` here.
    #[serde(rename = "type")]
    pub kind: String,
}

impl AccessConfig {
    /// Requests an ephemeral public address.
    #[must_use]
    pub fn external_nat() -> Self {
        Self {
            name: String::from("External NAT"),
            kind: String::from("ONE_TO_ONE_NAT"),
        }
    }
}

/// Network interface requested for a new instance.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceConfig {
    /// Locator of the network.
    pub network: SelfLink,
    /// External access configurations; empty for internal-only instances.
    pub access_configs: Vec<AccessConfig>,
}

impl NetworkInterfaceConfig {
    /// Builds an interface on `network`, optionally granting a public address.
    #[must_use]
    pub fn new(network: &Network, public_address: bool) -> Self {
        let access_configs = if public_address {
            vec![AccessConfig::external_nat()]
        } else {
            Vec::new()
        };
        Self {
            network: network.self_link.clone(),
            access_configs,
        }
    }
}

/// Single metadata key/value entry.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MetadataItem {
    /// Metadata key.
    pub key: String,
    /// Metadata value.
    pub value: String,
}

/// Instance metadata.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Metadata {
    /// Entries in insertion order.
    pub items: Vec<MetadataItem>,
}

impl Metadata {
    /// Appends an entry.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.items.push(MetadataItem {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Looks up the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.key == key)
            .map(|item| item.value.as_str())
    }
}

/// Network tags applied to an instance.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Tags {
    /// Tag values.
    pub items: Vec<String>,
}

/// Service account granted to the instance.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ServiceAccount {
    /// Account email; `default` selects the project's compute account.
    pub email: String,
    /// OAuth scopes granted to the account.
    pub scopes: Vec<String>,
}

/// Fully-resolved instance insert request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfig {
    /// Instance name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Locator of the machine type.
    pub machine_type: SelfLink,
    /// Attached disks; the first is the boot disk.
    pub disks: Vec<AttachedDisk>,
    /// Network interfaces.
    pub network_interfaces: Vec<NetworkInterfaceConfig>,
    /// Instance metadata, including the login key.
    pub metadata: Metadata,
    /// Service accounts.
    pub service_accounts: Vec<ServiceAccount>,
    /// Network tags.
    pub tags: Tags,
}

/// Raw disk source for an image insert.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RawDisk {
    /// URL of the archive in object storage.
    pub source: String,
}

/// Image insert request referencing a bundled archive.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    /// Image name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Archive location.
    pub raw_disk: RawDisk,
}

impl ImageConfig {
    /// Builds an image request from an archive URL.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            raw_disk: RawDisk {
                source: source.into(),
            },
        }
    }
}
