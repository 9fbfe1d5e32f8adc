//! Tenant resolution.
//!
//! Maps a verified token to its [`TenantContext`]:
//!
//! ```text
//! issuer URL ──► realm ──► Account(realm) ──► Workspace(realm) ──► cluster id
//!  .../realms/acme          type == "org"      spec.cluster or kcp.io/cluster
//! ```
//!
//! Every failure aborts the request. Nothing is cached at this layer.

use std::sync::Arc;

use async_trait::async_trait;
use fgaiam_backends::ControlPlane;
use fgaiam_domain::{DomainError, DomainResult, TenantContext};
use tracing::{debug, instrument};

use crate::context::RequestContext;
use crate::errors::upstream_error;

/// Account type of organizations.
pub const ORGANIZATION_ACCOUNT_TYPE: &str = "org";

/// Resolves the tenant of a request.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    async fn resolve(&self, ctx: &RequestContext) -> DomainResult<TenantContext>;
}

/// Returns the context's tenant, resolving it when the transport has not.
pub async fn tenant_of(
    resolver: &dyn TenantResolver,
    ctx: &RequestContext,
) -> DomainResult<TenantContext> {
    match ctx.resolved_tenant() {
        Some(tenant) => Ok(tenant.clone()),
        None => resolver.resolve(ctx).await,
    }
}

/// Settings of [`TenantContextResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantResolverConfig {
    /// Realms that are never accepted as tenants.
    pub excluded_tenants: Vec<String>,
    /// Logical cluster holding organization accounts and workspaces.
    pub organizations_cluster: String,
}

impl Default for TenantResolverConfig {
    fn default() -> Self {
        Self {
            excluded_tenants: vec!["master".to_string()],
            organizations_cluster: "root:orgs".to_string(),
        }
    }
}

/// Extracts the realm from an issuer URL of the form `<base>/realms/<realm>[/]`.
pub fn idm_tenant_from_issuer(issuer: &str) -> DomainResult<String> {
    let url = url::Url::parse(issuer).map_err(|e| DomainError::Authentication {
        message: format!("issuer is not a valid URL: {e}"),
    })?;

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|segment| !segment.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        [base @ .., "realms", realm] if !base.contains(&"realms") => Ok(realm.to_string()),
        _ => Err(DomainError::Authentication {
            message: format!("issuer does not end with a single realms/<realm>: {issuer}"),
        }),
    }
}

/// Resolves tenants through the control plane.
pub struct TenantContextResolver {
    control_plane: Arc<dyn ControlPlane>,
    config: TenantResolverConfig,
}

impl TenantContextResolver {
    pub fn new(control_plane: Arc<dyn ControlPlane>, config: TenantResolverConfig) -> Self {
        Self {
            control_plane,
            config,
        }
    }

    /// Resolves the tenant and stores it in `ctx`.
    pub async fn resolve_into(&self, ctx: &mut RequestContext) -> DomainResult<()> {
        let tenant = self.resolve(ctx).await?;
        ctx.set_tenant(tenant);
        Ok(())
    }
}

#[async_trait]
impl TenantResolver for TenantContextResolver {
    #[instrument(skip(self, ctx))]
    async fn resolve(&self, ctx: &RequestContext) -> DomainResult<TenantContext> {
        let issuer = ctx.claims().issuer.trim();
        if issuer.is_empty() {
            return Err(DomainError::Authentication {
                message: "token has no issuer".to_string(),
            });
        }

        let realm = idm_tenant_from_issuer(issuer)?;
        if self.config.excluded_tenants.iter().any(|t| *t == realm) {
            return Err(DomainError::TenantRejected {
                reason: format!("realm {realm} is not a tenant"),
            });
        }

        let cluster = self.config.organizations_cluster.as_str();

        let account = self
            .control_plane
            .get_account(cluster, &realm)
            .await
            .map_err(|e| upstream_error(&e))?
            .ok_or_else(|| DomainError::not_found("account", &realm))?;
        if account.account_type != ORGANIZATION_ACCOUNT_TYPE {
            return Err(DomainError::TenantRejected {
                reason: format!(
                    "account {realm} has type '{}', expected '{ORGANIZATION_ACCOUNT_TYPE}'",
                    account.account_type
                ),
            });
        }

        let workspace = self
            .control_plane
            .get_workspace(cluster, &realm)
            .await
            .map_err(|e| upstream_error(&e))?
            .ok_or_else(|| DomainError::not_found("workspace", &realm))?;
        let cluster_id = workspace
            .cluster_id()
            .ok_or_else(|| DomainError::not_found("workspace cluster", &realm))?
            .to_string();

        debug!(realm = %realm, cluster_id = %cluster_id, "resolved tenant");
        Ok(TenantContext::new(realm.clone(), cluster_id, realm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TokenClaims;
    use fgaiam_backends::{Account, MemoryBackend, Workspace};

    const ISSUER: &str = "https://idm.example.com/realms/acme";

    fn org_backend() -> Arc<MemoryBackend> {
        let backend = MemoryBackend::new_shared();
        backend.add_account(
            "root:orgs",
            Account {
                name: "acme".to_string(),
                account_type: "org".to_string(),
            },
        );
        backend.add_workspace(
            "root:orgs",
            Workspace {
                name: "acme".to_string(),
                cluster: Some("1mxz9".to_string()),
                ..Default::default()
            },
        );
        backend
    }

    fn resolver(backend: Arc<MemoryBackend>) -> TenantContextResolver {
        TenantContextResolver::new(backend, TenantResolverConfig::default())
    }

    fn ctx(issuer: &str) -> RequestContext {
        RequestContext::new(TokenClaims::new(issuer, "sub-1"))
    }

    #[test]
    fn test_realm_is_taken_from_issuer_path() {
        assert_eq!(idm_tenant_from_issuer(ISSUER).unwrap(), "acme");
        assert_eq!(
            idm_tenant_from_issuer("https://idm.example.com/auth/realms/acme/").unwrap(),
            "acme"
        );
    }

    #[test]
    fn test_issuer_without_realm_is_rejected() {
        for issuer in [
            "not a url",
            "https://idm.example.com/",
            "https://idm.example.com/realms",
            "https://idm.example.com/realms/",
            "https://idm.example.com/realms/acme/protocol/openid-connect",
            "https://idm.example.com/realms/master/x/realms/acme",
            "https://idm.example.com/realms/master/x",
        ] {
            assert!(
                matches!(
                    idm_tenant_from_issuer(issuer),
                    Err(DomainError::Authentication { .. })
                ),
                "issuer {issuer} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_resolves_org_tenant() {
        let tenant = resolver(org_backend()).resolve(&ctx(ISSUER)).await.unwrap();
        assert_eq!(tenant, TenantContext::new("acme", "1mxz9", "acme"));
    }

    #[tokio::test]
    async fn test_resolve_into_stores_tenant() {
        let mut ctx = ctx(ISSUER);
        resolver(org_backend()).resolve_into(&mut ctx).await.unwrap();
        assert_eq!(ctx.tenant().unwrap().organization_name, "acme");
    }

    #[tokio::test]
    async fn test_excluded_realm_fails_closed_without_lookups() {
        let backend = org_backend();
        let err = resolver(backend.clone())
            .resolve(&ctx("https://idm.example.com/realms/master"))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::TenantRejected { .. }));
        assert_eq!(backend.control_plane_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_issuer_is_authentication_error() {
        let err = resolver(org_backend()).resolve(&ctx("")).await.unwrap_err();
        assert!(matches!(err, DomainError::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_missing_account_is_not_found() {
        let err = resolver(org_backend())
            .resolve(&ctx("https://idm.example.com/realms/globex"))
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::not_found("account", "globex"));
    }

    #[tokio::test]
    async fn test_non_org_account_is_rejected() {
        let backend = org_backend();
        backend.add_account(
            "root:orgs",
            Account {
                name: "acme".to_string(),
                account_type: "account".to_string(),
            },
        );

        let err = resolver(backend).resolve(&ctx(ISSUER)).await.unwrap_err();
        assert!(matches!(err, DomainError::TenantRejected { .. }));
    }

    #[tokio::test]
    async fn test_cluster_id_falls_back_to_annotation() {
        let backend = org_backend();
        let mut workspace = Workspace {
            name: "acme".to_string(),
            ..Default::default()
        };
        workspace
            .annotations
            .insert("kcp.io/cluster".to_string(), "2abc".to_string());
        backend.add_workspace("root:orgs", workspace);

        let tenant = resolver(backend).resolve(&ctx(ISSUER)).await.unwrap();
        assert_eq!(tenant.cluster_id, "2abc");
    }

    #[tokio::test]
    async fn test_workspace_without_cluster_is_not_found() {
        let backend = org_backend();
        backend.add_workspace(
            "root:orgs",
            Workspace {
                name: "acme".to_string(),
                ..Default::default()
            },
        );

        let err = resolver(backend).resolve(&ctx(ISSUER)).await.unwrap_err();
        assert_eq!(err, DomainError::not_found("workspace cluster", "acme"));
    }

    #[tokio::test]
    async fn test_control_plane_failure_is_upstream() {
        let backend = org_backend();
        backend.set_fail_control_plane(true);

        let err = resolver(backend).resolve(&ctx(ISSUER)).await.unwrap_err();
        match err {
            DomainError::Upstream { dependency, .. } => assert_eq!(dependency, "control-plane"),
            other => panic!("expected upstream error, got {other:?}"),
        }
    }
}
