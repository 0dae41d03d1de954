//! Configuration loading via `ortho-config` and validation into a typed
//! [`BuildRequest`].

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::compute::DEFAULT_API_ENDPOINT;

/// Metadata key reserved for the generated login key.
pub const SSH_KEYS_METADATA_KEY: &str = "ssh-keys";

/// Build settings merged from defaults, `kiln.toml` and `KILN_*` environment
/// variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "KILN",
    discovery(
        app_name = "kiln",
        env_var = "KILN_CONFIG_PATH",
        config_file_name = "kiln.toml",
        dotfile_name = ".kiln.toml",
        project_file_name = "kiln.toml"
    )
)]
pub struct BuildConfig {
    /// Project that owns the build instance and the resulting image. When
    /// unset it is derived from the client-secrets file.
    pub project_id: Option<String>,
    /// Zone in which the build instance runs.
    pub zone: Option<String>,
    /// Machine type of the build instance.
    #[ortho_config(default = "n1-standard-1".to_owned())]
    pub machine_type: String,
    /// Name of the image the build instance boots from.
    pub source_image: Option<String>,
    /// Public project searched when the source image is not in
    /// `project_id`.
    #[ortho_config(default = "debian-cloud".to_owned())]
    pub fallback_image_project: String,
    /// Network the build instance attaches to.
    #[ortho_config(default = "default".to_owned())]
    pub network: String,
    /// Name of the image to create. Defaults to `kiln-<unix seconds>`.
    pub image_name: Option<String>,
    /// Description stored on the created image.
    #[ortho_config(default = "Created by kiln".to_owned())]
    pub image_description: String,
    /// Object-storage bucket receiving the disk archive.
    pub bucket_name: Option<String>,
    /// Login user on the build instance.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_username: String,
    /// SSH port on the build instance.
    #[ortho_config(default = 22)]
    pub ssh_port: u16,
    /// Seconds to wait for SSH to become reachable.
    #[ortho_config(default = 300)]
    pub ssh_timeout_secs: u64,
    /// Seconds to wait for each cloud operation or instance state change.
    #[ortho_config(default = 300)]
    pub state_timeout_secs: u64,
    /// Seconds between two polls of the same resource.
    #[ortho_config(default = 2)]
    pub poll_interval_secs: u64,
    /// Whether to refresh `gsutil` on the instance before capturing.
    #[ortho_config(default = false)]
    pub update_gsutil: bool,
    /// Whether to pause after every step until Enter is pressed.
    #[ortho_config(default = false)]
    pub debug: bool,
    /// Path to the service-account client-secrets JSON file.
    pub client_secrets_path: Option<String>,
    /// Pre-issued OAuth access token; when unset `gcloud` is asked for one.
    pub access_token: Option<String>,
    /// Path to the `gcloud` executable.
    #[ortho_config(default = "gcloud".to_owned())]
    pub gcloud_bin: String,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `ssh-keygen` executable.
    #[ortho_config(default = "ssh-keygen".to_owned())]
    pub ssh_keygen_bin: String,
    /// Base URL of the Compute Engine API.
    #[ortho_config(default = DEFAULT_API_ENDPOINT.to_owned())]
    pub api_endpoint: String,
}

impl BuildConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("kiln")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Seeds a [`BuildRequestBuilder`] from the loaded values.
    ///
    /// `derived_project` is used when `project_id` is not configured, usually
    /// the project derived from the client-secrets file.
    #[must_use]
    pub fn request_builder(&self, derived_project: Option<&str>) -> BuildRequestBuilder {
        let project = self
            .project_id
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .or(derived_project)
            .unwrap_or_default();
        let image_name = self
            .image_name
            .clone()
            .unwrap_or_else(default_image_name);

        BuildRequest::builder()
            .project_id(project)
            .zone(self.zone.clone().unwrap_or_default())
            .machine_type(&self.machine_type)
            .source_image(self.source_image.clone().unwrap_or_default())
            .fallback_image_project(&self.fallback_image_project)
            .network(&self.network)
            .image_name(image_name)
            .image_description(&self.image_description)
            .bucket_name(self.bucket_name.clone().unwrap_or_default())
            .ssh_username(&self.ssh_username)
            .ssh_port(self.ssh_port)
            .ssh_timeout(Duration::from_secs(self.ssh_timeout_secs))
            .state_timeout(Duration::from_secs(self.state_timeout_secs))
            .poll_interval(Duration::from_secs(self.poll_interval_secs))
            .update_gsutil(self.update_gsutil)
            .debug(self.debug)
    }
}

fn default_image_name() -> String {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs());
    format!("kiln-{seconds}")
}

/// Validated settings consumed by the build pipeline.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildRequest {
    /// Project that owns the instance and the image.
    pub project_id: String,
    /// Zone of the build instance.
    pub zone: String,
    /// Machine type name.
    pub machine_type: String,
    /// Source image name.
    pub source_image: String,
    /// Project searched when the source image is not in `project_id`.
    pub fallback_image_project: String,
    /// Network name.
    pub network: String,
    /// Name of the image to create.
    pub image_name: String,
    /// Description of the image to create.
    pub image_description: String,
    /// Bucket receiving the disk archive.
    pub bucket_name: String,
    /// Login user.
    pub ssh_username: String,
    /// SSH port.
    pub ssh_port: u16,
    /// Budget for SSH to become reachable.
    pub ssh_timeout: Duration,
    /// Budget for each operation or instance state wait.
    pub state_timeout: Duration,
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Extra instance metadata.
    pub metadata: BTreeMap<String, String>,
    /// Network tags.
    pub tags: Vec<String>,
    /// Shell commands run on the instance before capture, in order.
    pub provision_commands: Vec<String>,
    /// Whether to refresh `gsutil` before capture.
    pub update_gsutil: bool,
    /// Whether to pause between steps.
    pub debug: bool,
}

impl BuildRequest {
    /// Starts a builder for a [`BuildRequest`].
    #[must_use]
    pub fn builder() -> BuildRequestBuilder {
        BuildRequestBuilder::new()
    }

    /// Name of the disk archive uploaded to object storage.
    #[must_use]
    pub fn archive_name(&self) -> String {
        format!("{}.tar.gz", self.image_name)
    }

    /// `gs://` URL the archive is uploaded to.
    #[must_use]
    pub fn archive_upload_url(&self) -> String {
        format!("gs://{}/{}", self.bucket_name, self.archive_name())
    }

    /// HTTPS URL the image insert reads the archive from.
    #[must_use]
    pub fn archive_source_url(&self) -> String {
        format!(
            "https://storage.googleapis.com/{}/{}",
            self.bucket_name,
            self.archive_name()
        )
    }
}

/// Builder for [`BuildRequest`] that trims inputs and validates every field
/// on [`BuildRequestBuilder::build`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildRequestBuilder {
    project_id: String,
    zone: String,
    machine_type: String,
    source_image: String,
    fallback_image_project: String,
    network: String,
    image_name: String,
    image_description: String,
    bucket_name: String,
    ssh_username: String,
    ssh_port: u16,
    ssh_timeout: Duration,
    state_timeout: Duration,
    poll_interval: Duration,
    metadata: Vec<(String, String)>,
    tags: Vec<String>,
    provision_commands: Vec<String>,
    update_gsutil: bool,
    debug: bool,
}

impl Default for BuildRequestBuilder {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            zone: String::new(),
            machine_type: String::from("n1-standard-1"),
            source_image: String::new(),
            fallback_image_project: String::from("debian-cloud"),
            network: String::from("default"),
            image_name: String::new(),
            image_description: String::from("Created by kiln"),
            bucket_name: String::new(),
            ssh_username: String::from("root"),
            ssh_port: 22,
            ssh_timeout: Duration::from_secs(300),
            state_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(2),
            metadata: Vec::new(),
            tags: Vec::new(),
            provision_commands: Vec::new(),
            update_gsutil: false,
            debug: false,
        }
    }
}

macro_rules! string_setter {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[must_use]
        pub fn $name(mut self, value: impl Into<String>) -> Self {
            self.$name = value.into();
            self
        }
    };
}

impl BuildRequestBuilder {
    /// Creates a builder holding the documented defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    string_setter!(
        /// Sets the project identifier.
        project_id
    );
    string_setter!(
        /// Sets the zone.
        zone
    );
    string_setter!(
        /// Sets the machine type.
        machine_type
    );
    string_setter!(
        /// Sets the source image name.
        source_image
    );
    string_setter!(
        /// Sets the fallback image project.
        fallback_image_project
    );
    string_setter!(
        /// Sets the network name.
        network
    );
    string_setter!(
        /// Sets the name of the image to create.
        image_name
    );
    string_setter!(
        /// Sets the image description.
        image_description
    );
    string_setter!(
        /// Sets the bucket name.
        bucket_name
    );
    string_setter!(
        /// Sets the login user.
        ssh_username
    );

    /// Sets the SSH port.
    #[must_use]
    pub const fn ssh_port(mut self, value: u16) -> Self {
        self.ssh_port = value;
        self
    }

    /// Sets the SSH reachability budget.
    #[must_use]
    pub const fn ssh_timeout(mut self, value: Duration) -> Self {
        self.ssh_timeout = value;
        self
    }

    /// Sets the operation and instance-state budget.
    #[must_use]
    pub const fn state_timeout(mut self, value: Duration) -> Self {
        self.state_timeout = value;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, value: Duration) -> Self {
        self.poll_interval = value;
        self
    }

    /// Adds one metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    /// Adds one network tag.
    #[must_use]
    pub fn tag(mut self, value: impl Into<String>) -> Self {
        self.tags.push(value.into());
        self
    }

    /// Appends a provisioning command.
    #[must_use]
    pub fn provision_command(mut self, value: impl Into<String>) -> Self {
        self.provision_commands.push(value.into());
        self
    }

    /// Enables or disables the `gsutil` refresh step.
    #[must_use]
    pub const fn update_gsutil(mut self, value: bool) -> Self {
        self.update_gsutil = value;
        self
    }

    /// Enables or disables pausing between steps.
    #[must_use]
    pub const fn debug(mut self, value: bool) -> Self {
        self.debug = value;
        self
    }

    /// Validates every field and builds the request.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing every problem found.
    pub fn build(self) -> Result<BuildRequest, ConfigError> {
        let mut problems = Vec::new();

        let project_id = required(&self.project_id, &PROJECT_ID, &mut problems);
        let zone = required(&self.zone, &ZONE, &mut problems);
        let machine_type = required(&self.machine_type, &MACHINE_TYPE, &mut problems);
        let source_image = required(&self.source_image, &SOURCE_IMAGE, &mut problems);
        let fallback_image_project =
            required(&self.fallback_image_project, &FALLBACK_PROJECT, &mut problems);
        let network = required(&self.network, &NETWORK, &mut problems);
        let image_name = required(&self.image_name, &IMAGE_NAME, &mut problems);
        let bucket_name = required(&self.bucket_name, &BUCKET_NAME, &mut problems);
        let ssh_username = required(&self.ssh_username, &SSH_USERNAME, &mut problems);

        if !image_name.is_empty() && !is_valid_resource_name(&image_name) {
            problems.push(format!(
                "invalid image_name '{image_name}': use 1-63 lowercase letters, digits or \
                 hyphens, starting with a letter and not ending with a hyphen"
            ));
        }
        if bucket_name.contains('/') {
            problems.push(format!(
                "invalid bucket_name '{bucket_name}': give the bucket name without a gs:// prefix or path"
            ));
        }
        if self.ssh_port == 0 {
            problems.push(String::from("invalid ssh_port: must be between 1 and 65535"));
        }
        for (field, value) in [
            ("ssh_timeout_secs", self.ssh_timeout),
            ("state_timeout_secs", self.state_timeout),
            ("poll_interval_secs", self.poll_interval),
        ] {
            if value.is_zero() {
                problems.push(format!("invalid {field}: must be greater than zero"));
            }
        }

        let metadata = collect_metadata(self.metadata, &mut problems);
        let tags = collect_tags(self.tags, &mut problems);
        let provision_commands = self
            .provision_commands
            .into_iter()
            .map(|command| command.trim().to_owned())
            .filter(|command| !command.is_empty())
            .collect();

        if !problems.is_empty() {
            return Err(ConfigError::Invalid(problems));
        }

        Ok(BuildRequest {
            project_id,
            zone,
            machine_type,
            source_image,
            fallback_image_project,
            network,
            image_name,
            image_description: self.image_description.trim().to_owned(),
            bucket_name,
            ssh_username,
            ssh_port: self.ssh_port,
            ssh_timeout: self.ssh_timeout,
            state_timeout: self.state_timeout,
            poll_interval: self.poll_interval,
            metadata,
            tags,
            provision_commands,
            update_gsutil: self.update_gsutil,
            debug: self.debug,
        })
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

const PROJECT_ID: FieldMetadata = FieldMetadata::new("project ID", "KILN_PROJECT_ID", "project_id");
const ZONE: FieldMetadata = FieldMetadata::new("zone", "KILN_ZONE", "zone");
const MACHINE_TYPE: FieldMetadata =
    FieldMetadata::new("machine type", "KILN_MACHINE_TYPE", "machine_type");
const SOURCE_IMAGE: FieldMetadata =
    FieldMetadata::new("source image", "KILN_SOURCE_IMAGE", "source_image");
const FALLBACK_PROJECT: FieldMetadata = FieldMetadata::new(
    "fallback image project",
    "KILN_FALLBACK_IMAGE_PROJECT",
    "fallback_image_project",
);
const NETWORK: FieldMetadata = FieldMetadata::new("network", "KILN_NETWORK", "network");
const IMAGE_NAME: FieldMetadata = FieldMetadata::new("image name", "KILN_IMAGE_NAME", "image_name");
const BUCKET_NAME: FieldMetadata =
    FieldMetadata::new("bucket name", "KILN_BUCKET_NAME", "bucket_name");
const SSH_USERNAME: FieldMetadata =
    FieldMetadata::new("SSH username", "KILN_SSH_USERNAME", "ssh_username");

fn required(value: &str, metadata: &FieldMetadata, problems: &mut Vec<String>) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        problems.push(format!(
            "missing {}: set {} or add {} to kiln.toml",
            metadata.description, metadata.env_var, metadata.toml_key
        ));
    }
    trimmed.to_owned()
}

fn collect_metadata(
    entries: Vec<(String, String)>,
    problems: &mut Vec<String>,
) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    for (raw_key, value) in entries {
        let key = raw_key.trim();
        if key.is_empty() {
            problems.push(String::from("invalid metadata entry: key must not be empty"));
            continue;
        }
        if key == SSH_KEYS_METADATA_KEY {
            problems.push(format!(
                "invalid metadata entry: '{SSH_KEYS_METADATA_KEY}' is reserved for the generated login key"
            ));
            continue;
        }
        metadata.insert(key.to_owned(), value);
    }
    metadata
}

fn collect_tags(tags: Vec<String>, problems: &mut Vec<String>) -> Vec<String> {
    let mut collected = Vec::with_capacity(tags.len());
    for tag in tags {
        let trimmed = tag.trim();
        if is_valid_resource_name(trimmed) {
            collected.push(trimmed.to_owned());
        } else {
            problems.push(format!(
                "invalid tag '{trimmed}': use lowercase letters, digits or hyphens"
            ));
        }
    }
    collected
}

/// Checks the `[a-z]([-a-z0-9]*[a-z0-9])?` naming rule, at most 63 characters.
fn is_valid_resource_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_with_letter = chars.next().is_some_and(|first| first.is_ascii_lowercase());
    starts_with_letter
        && name.len() <= 63
        && !name.ends_with('-')
        && name
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Every validation problem found, in field order.
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
