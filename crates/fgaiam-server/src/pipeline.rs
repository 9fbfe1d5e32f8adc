//! Wiring of the services from configuration.
//!
//! ```text
//! ServiceConfig ─┬─ OpenFgaClient ──────┬─ AuthorizationStoreCache ─┬─ RoleListingService ─┐
//!                │                      └───────────────────────────┴─ FieldAuthorizationGate
//!                ├─ KeycloakClient ─────── IdentityEnrichmentService ──────────────────────┤
//!                └─ ControlPlaneClient ─── TenantContextResolver ──────────────────────────┴─ UserService
//! ```
//!
//! Every service instance owns its caches, so two pipelines never share
//! cached store ids or identities.

use std::sync::Arc;
use std::time::Duration;

use fgaiam_backends::{
    AuthorizationEngine, BackendError, ControlPlane, ControlPlaneClient, ControlPlaneClientConfig,
    IdentityProvider, KeycloakClient, KeycloakClientConfig, OpenFgaClient, OpenFgaClientConfig,
};
use fgaiam_domain::cache::register_cache_metrics;
use fgaiam_domain::DomainError;
use thiserror::Error;
use tracing::info;

use crate::catalog::StaticRoleCatalog;
use crate::config::{ConfigLoadError, ServiceConfig};
use crate::context::RequestContext;
use crate::errors::{classify_error, ClientError, ErrorConfig};
use crate::gate::FieldAuthorizationGate;
use crate::identity::{IdentityEnrichmentConfig, IdentityEnrichmentService};
use crate::observability::init_logging;
use crate::roles::RoleListingService;
use crate::service::{UserService, UserServiceConfig};
use crate::store::AuthorizationStoreCache;
use crate::tenant::{TenantContextResolver, TenantResolverConfig};

/// Errors building a [`Pipeline`].
#[derive(Debug, Error)]
pub enum PipelineInitError {
    #[error(transparent)]
    Config(#[from] ConfigLoadError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// The assembled services.
pub struct Pipeline {
    tenants: Arc<TenantContextResolver>,
    users: UserService,
    gate: FieldAuthorizationGate,
    error_config: ErrorConfig,
}

impl Pipeline {
    /// Validates `config`, installs logging and builds the clients and services.
    ///
    /// Must run inside a Tokio runtime, since the OpenFGA channel is spawned
    /// lazily on it.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, PipelineInitError> {
        config.validate()?;
        let logging_installed = init_logging(&config.logging)?;
        register_cache_metrics();

        let mut openfga = OpenFgaClientConfig::new(&config.openfga.url)
            .with_timeout(Duration::from_secs(config.openfga.request_timeout_secs));
        if let Some(token) = &config.openfga.api_token {
            openfga = openfga.with_api_token(token);
        }

        let keycloak = KeycloakClientConfig::new(
            &config.idm.url,
            &config.idm.client_id,
            &config.idm.client_secret,
        )
        .with_auth_realm(&config.idm.auth_realm)
        .with_timeout(Duration::from_secs(config.idm.request_timeout_secs));

        let mut control_plane = ControlPlaneClientConfig::new(&config.control_plane.url)
            .with_timeout(Duration::from_secs(
                config.control_plane.request_timeout_secs,
            ));
        if let Some(token) = &config.control_plane.token {
            control_plane = control_plane.with_token(token);
        }

        let pipeline = Self::with_backends(
            config,
            Arc::new(OpenFgaClient::new(openfga)?),
            Arc::new(KeycloakClient::new(keycloak)?),
            Arc::new(ControlPlaneClient::new(control_plane)?),
        );

        info!(
            openfga = %config.openfga.url,
            idm = %config.idm.url,
            control_plane = %config.control_plane.url,
            logging_installed,
            "pipeline initialized"
        );
        Ok(pipeline)
    }

    /// Builds the services over the given backends without validating `config`.
    pub fn with_backends(
        config: &ServiceConfig,
        engine: Arc<dyn AuthorizationEngine>,
        identity: Arc<dyn IdentityProvider>,
        control_plane: Arc<dyn ControlPlane>,
    ) -> Self {
        let tenants = Arc::new(TenantContextResolver::new(
            control_plane,
            TenantResolverConfig {
                excluded_tenants: config.idm.excluded_tenants.clone(),
                organizations_cluster: config.control_plane.organizations_cluster.clone(),
            },
        ));
        let stores = Arc::new(AuthorizationStoreCache::new(
            engine.clone(),
            config.cache.store.to_cache_config(),
        ));
        let catalog = Arc::new(StaticRoleCatalog::from_settings(&config.roles));

        let roles = Arc::new(RoleListingService::new(
            engine.clone(),
            stores.clone(),
            catalog.clone(),
        ));
        let identities = Arc::new(IdentityEnrichmentService::new(
            identity,
            config.cache.identity.to_cache_config(),
            IdentityEnrichmentConfig::default()
                .with_max_concurrent_lookups(config.users.max_concurrent_lookups)
                .with_lookup_timeout(config.users.lookup_timeout()),
        ));

        let users = UserService::new(
            tenants.clone(),
            roles,
            identities,
            catalog,
            UserServiceConfig::from(&config.users),
        );
        let gate = FieldAuthorizationGate::new(engine, stores, tenants.clone());

        Self {
            tenants,
            users,
            gate,
            error_config: ErrorConfig::from(&config.errors),
        }
    }

    /// Resolves the request's tenant once, before any field resolves.
    pub async fn resolve_tenant(&self, ctx: &mut RequestContext) -> Result<(), ClientError> {
        self.tenants
            .resolve_into(ctx)
            .await
            .map_err(|e| self.client_error(&e))
    }

    pub fn users(&self) -> &UserService {
        &self.users
    }

    pub fn gate(&self) -> &FieldAuthorizationGate {
        &self.gate
    }

    /// Client-facing form of `err` at the configured detail level.
    pub fn client_error(&self, err: &DomainError) -> ClientError {
        classify_error(err, &self.error_config)
    }
}
