//! Keycloak admin REST client.
//!
//! Authenticates with the client-credentials grant against `auth_realm` and
//! searches users of any realm through the admin API. The access token is
//! cached until shortly before it expires.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::{BackendError, BackendResult, KEYCLOAK};
use crate::traits::{IdentityProvider, IdentityRecord};

/// Tokens are refreshed this long before their reported expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Connection settings for [`KeycloakClient`].
#[derive(Debug, Clone)]
pub struct KeycloakClientConfig {
    /// Base URL of the Keycloak server, e.g. `https://idm.example.com`.
    pub base_url: String,
    /// Realm the service account authenticates against.
    pub auth_realm: String,
    pub client_id: String,
    pub client_secret: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl KeycloakClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            auth_realm: "master".to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_auth_realm(mut self, realm: impl Into<String>) -> Self {
        self.auth_realm = realm.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// [`IdentityProvider`] backed by the Keycloak admin API.
#[derive(Debug)]
pub struct KeycloakClient {
    http: Client,
    base_url: String,
    auth_realm: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl KeycloakClient {
    pub fn new(config: KeycloakClientConfig) -> BackendResult<Self> {
        if config.client_id.is_empty() {
            return Err(BackendError::Config {
                service: KEYCLOAK,
                message: "client_id must not be empty".to_string(),
            });
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Config {
                service: KEYCLOAK,
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_realm: config.auth_realm,
            client_id: config.client_id,
            client_secret: config.client_secret,
            token: Mutex::new(None),
        })
    }

    /// Returns a valid access token, requesting a new one when needed.
    async fn access_token(&self) -> BackendResult<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.base_url, self.auth_realm
        );
        let response = self
            .http
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| BackendError::transport(KEYCLOAK, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                service: KEYCLOAK,
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BackendError::decode(KEYCLOAK, e))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        debug!(expires_in = token.expires_in, "obtained keycloak access token");
        *guard = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }
}

#[async_trait]
impl IdentityProvider for KeycloakClient {
    #[instrument(skip(self))]
    async fn find_users_by_email(
        &self,
        realm: &str,
        email: &str,
    ) -> BackendResult<Vec<IdentityRecord>> {
        let token = self.access_token().await?;
        let url = format!("{}/admin/realms/{}/users", self.base_url, realm);

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(&[
                ("email", email),
                ("exact", "true"),
                ("max", "1"),
                ("briefRepresentation", "true"),
            ])
            .send()
            .await
            .map_err(|e| BackendError::transport(KEYCLOAK, e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                service: KEYCLOAK,
                status: status.as_u16(),
                body,
            });
        }

        let users: Vec<UserRepresentation> = response
            .json()
            .await
            .map_err(|e| BackendError::decode(KEYCLOAK, e))?;

        Ok(users
            .into_iter()
            .map(|u| IdentityRecord {
                id: u.id,
                email: u.email,
                first_name: u.first_name,
                last_name: u.last_name,
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    60
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRepresentation {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}
