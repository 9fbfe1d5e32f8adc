//! Control-plane REST client.
//!
//! Reads `Account` and `Workspace` objects from a logical cluster of a
//! kcp-style control plane:
//!
//! ```text
//! {base}/clusters/{cluster}/apis/core.platform-mesh.io/v1alpha1/accounts/{name}
//! {base}/clusters/{cluster}/apis/tenancy.kcp.io/v1alpha1/workspaces/{name}
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{BackendError, BackendResult, CONTROL_PLANE};
use crate::traits::{Account, ControlPlane, Workspace};

const ACCOUNTS_API: &str = "apis/core.platform-mesh.io/v1alpha1/accounts";
const WORKSPACES_API: &str = "apis/tenancy.kcp.io/v1alpha1/workspaces";

/// Connection settings for [`ControlPlaneClient`].
#[derive(Debug, Clone)]
pub struct ControlPlaneClientConfig {
    /// Base URL of the control plane API server.
    pub base_url: String,
    /// Optional bearer token.
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ControlPlaneClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`ControlPlane`] backed by the control plane's REST API.
#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ControlPlaneClient {
    pub fn new(config: ControlPlaneClientConfig) -> BackendResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Config {
                service: CONTROL_PLANE,
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    fn object_url(&self, cluster: &str, api: &str, name: &str) -> String {
        format!("{}/clusters/{}/{}/{}", self.base_url, cluster, api, name)
    }

    /// GETs an object; a 404 is `Ok(None)`.
    async fn get_object<T: DeserializeOwned>(&self, url: String) -> BackendResult<Option<T>> {
        let mut request = self.http.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::transport(CONTROL_PLANE, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                service: CONTROL_PLANE,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| BackendError::decode(CONTROL_PLANE, e))
    }
}

#[async_trait]
impl ControlPlane for ControlPlaneClient {
    #[instrument(skip(self))]
    async fn get_account(&self, cluster: &str, name: &str) -> BackendResult<Option<Account>> {
        let url = self.object_url(cluster, ACCOUNTS_API, name);
        let object: Option<AccountObject> = self.get_object(url).await?;
        debug!(found = object.is_some(), "fetched account");

        Ok(object.map(|o| Account {
            name: o.metadata.name,
            account_type: o.spec.account_type,
        }))
    }

    #[instrument(skip(self))]
    async fn get_workspace(&self, cluster: &str, name: &str) -> BackendResult<Option<Workspace>> {
        let url = self.object_url(cluster, WORKSPACES_API, name);
        let object: Option<WorkspaceObject> = self.get_object(url).await?;
        debug!(found = object.is_some(), "fetched workspace");

        Ok(object.map(|o| Workspace {
            name: o.metadata.name,
            cluster: o.spec.cluster,
            annotations: o.metadata.annotations,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct AccountSpec {
    #[serde(rename = "type", default)]
    account_type: String,
}

#[derive(Debug, Deserialize)]
struct AccountObject {
    metadata: ObjectMeta,
    spec: AccountSpec,
}

#[derive(Debug, Default, Deserialize)]
struct WorkspaceSpec {
    #[serde(default)]
    cluster: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceObject {
    metadata: ObjectMeta,
    #[serde(default)]
    spec: WorkspaceSpec,
}
