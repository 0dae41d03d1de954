//! HTTP implementation of [`ComputeApi`] against the Compute Engine v1 REST API.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::{
    Image, ImageConfig, Instance, InstanceConfig, MachineType, Network, Operation, ResourceKind,
    Zone,
};
use super::{ComputeApi, ComputeError, ComputeFuture};

/// Base URL of the public Compute Engine v1 API.
pub const DEFAULT_API_ENDPOINT: &str = "https://compute.googleapis.com/compute/v1";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[derive(Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default, rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorMessage,
}

#[derive(Deserialize)]
struct ApiErrorMessage {
    #[serde(default)]
    message: String,
}

/// Compute Engine client bound to one project and one access token.
#[derive(Clone)]
pub struct GceClient {
    project_id: String,
    token: String,
    endpoint: String,
}

impl fmt::Debug for GceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GceClient")
            .field("project_id", &self.project_id)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl GceClient {
    /// Creates a client for `project_id` using the public API endpoint.
    #[must_use]
    pub fn new(project_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            token: token.into(),
            endpoint: DEFAULT_API_ENDPOINT.to_owned(),
        }
    }

    /// Overrides the API base URL, for example to target an emulator.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_owned();
        self
    }

    /// Returns the configured API base URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn project_url(&self, project: &str, path: &str) -> String {
        format!("{}/projects/{project}/{path}", self.endpoint)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        kind: ResourceKind,
        name: &str,
    ) -> Result<T, ComputeError> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            return serde_json::from_slice(&body).map_err(|err| ComputeError::Decode {
                message: err.to_string(),
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ComputeError::NotFound {
                kind,
                name: name.to_owned(),
            });
        }

        Err(ComputeError::Api {
            status: status.as_u16(),
            message: api_error_message(&body),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<T, ComputeError> {
        debug!(%url, "GET");
        self.execute(HTTP_CLIENT.get(url), kind, name).await
    }

    async fn list<T: DeserializeOwned>(
        &self,
        url: &str,
        kind: ResourceKind,
    ) -> Result<Vec<T>, ComputeError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            debug!(%url, page = page_token.as_deref(), "GET (list)");
            let mut request = HTTP_CLIENT.get(url);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }
            let page: ListResponse<T> = self.execute(request, kind, url).await?;
            items.extend(page.items);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(items),
            }
        }
    }

    async fn post<B: serde::Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Operation, ComputeError> {
        debug!(%url, "POST");
        self.execute(HTTP_CLIENT.post(url).json(body), kind, name)
            .await
    }

    async fn delete(
        &self,
        url: &str,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Operation, ComputeError> {
        debug!(%url, "DELETE");
        self.execute(HTTP_CLIENT.delete(url), kind, name).await
    }
}

pub(crate) fn api_error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ApiErrorBody>(body).map_or_else(
        |_| String::from_utf8_lossy(body).trim().to_owned(),
        |parsed| parsed.error.message,
    )
}

impl ComputeApi for GceClient {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    fn get_zone<'a>(&'a self, zone: &'a str) -> ComputeFuture<'a, Zone> {
        Box::pin(async move {
            let url = self.project_url(&self.project_id, &format!("zones/{zone}"));
            self.get(&url, ResourceKind::Zone, zone).await
        })
    }

    fn list_zones(&self) -> ComputeFuture<'_, Vec<Zone>> {
        Box::pin(async move {
            let url = self.project_url(&self.project_id, "zones");
            self.list(&url, ResourceKind::Zone).await
        })
    }

    fn get_machine_type<'a>(
        &'a self,
        zone: &'a str,
        name: &'a str,
    ) -> ComputeFuture<'a, MachineType> {
        Box::pin(async move {
            let url = self.project_url(
                &self.project_id,
                &format!("zones/{zone}/machineTypes/{name}"),
            );
            self.get(&url, ResourceKind::MachineType, name).await
        })
    }

    fn list_machine_types<'a>(&'a self, zone: &'a str) -> ComputeFuture<'a, Vec<MachineType>> {
        Box::pin(async move {
            let url = self.project_url(&self.project_id, &format!("zones/{zone}/machineTypes"));
            self.list(&url, ResourceKind::MachineType).await
        })
    }

    fn get_image<'a>(&'a self, project: &'a str, name: &'a str) -> ComputeFuture<'a, Image> {
        Box::pin(async move {
            let url = self.project_url(project, &format!("global/images/{name}"));
            self.get(&url, ResourceKind::Image, name).await
        })
    }

    fn list_images<'a>(&'a self, project: &'a str) -> ComputeFuture<'a, Vec<Image>> {
        Box::pin(async move {
            let url = self.project_url(project, "global/images");
            self.list(&url, ResourceKind::Image).await
        })
    }

    fn get_network<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, Network> {
        Box::pin(async move {
            let url = self.project_url(&self.project_id, &format!("global/networks/{name}"));
            self.get(&url, ResourceKind::Network, name).await
        })
    }

    fn insert_instance<'a>(
        &'a self,
        zone: &'a str,
        config: &'a InstanceConfig,
    ) -> ComputeFuture<'a, Operation> {
        Box::pin(async move {
            let url = self.project_url(&self.project_id, &format!("zones/{zone}/instances"));
            self.post(&url, config, ResourceKind::Zone, zone).await
        })
    }

    fn get_instance<'a>(&'a self, zone: &'a str, name: &'a str) -> ComputeFuture<'a, Instance> {
        Box::pin(async move {
            let url = self.project_url(
                &self.project_id,
                &format!("zones/{zone}/instances/{name}"),
            );
            self.get(&url, ResourceKind::Instance, name).await
        })
    }

    fn delete_instance<'a>(
        &'a self,
        zone: &'a str,
        name: &'a str,
    ) -> ComputeFuture<'a, Operation> {
        Box::pin(async move {
            let url = self.project_url(
                &self.project_id,
                &format!("zones/{zone}/instances/{name}"),
            );
            self.delete(&url, ResourceKind::Instance, name).await
        })
    }

    fn insert_image<'a>(&'a self, config: &'a ImageConfig) -> ComputeFuture<'a, Operation> {
        Box::pin(async move {
            let url = self.project_url(&self.project_id, "global/images");
            self.post(&url, config, ResourceKind::Image, &config.name)
                .await
        })
    }

    fn delete_image<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, Operation> {
        Box::pin(async move {
            let url = self.project_url(&self.project_id, &format!("global/images/{name}"));
            self.delete(&url, ResourceKind::Image, name).await
        })
    }

    fn get_zone_operation<'a>(
        &'a self,
        zone: &'a str,
        name: &'a str,
    ) -> ComputeFuture<'a, Operation> {
        Box::pin(async move {
            let url = self.project_url(
                &self.project_id,
                &format!("zones/{zone}/operations/{name}"),
            );
            self.get(&url, ResourceKind::Operation, name).await
        })
    }

    fn get_global_operation<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, Operation> {
        Box::pin(async move {
            let url = self.project_url(&self.project_id, &format!("global/operations/{name}"));
            self.get(&url, ResourceKind::Operation, name).await
        })
    }
}
