//! User service facade.
//!
//! The operations exposed to the API layer. Every call resolves the tenant
//! from the [`RequestContext`] first; nothing is read or written before the
//! tenant is known.

use std::sync::Arc;

use fgaiam_domain::listing::{paginate, sort_user_roles, PageDefaults};
use fgaiam_domain::{
    DomainResult, PageSpec, ResourceContext, Role, RoleAssignmentResult, RoleChange,
    RoleRemovalInput, RoleRemovalResult, SortSpec, UserConnection, UserIdentity, UserRoleMap,
    UserRoles,
};
use tracing::{debug, instrument};

use crate::catalog::RoleCatalog;
use crate::config::UserSettings;
use crate::context::RequestContext;
use crate::identity::IdentityLookup;
use crate::roles::RoleLister;
use crate::tenant::{tenant_of, TenantResolver};

/// Listing defaults of [`UserService`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserServiceConfig {
    pub default_sort: SortSpec,
    pub page_defaults: PageDefaults,
}

impl From<&UserSettings> for UserServiceConfig {
    fn from(settings: &UserSettings) -> Self {
        Self {
            default_sort: settings.default_sort(),
            page_defaults: settings.page_defaults(),
        }
    }
}

pub struct UserService {
    tenants: Arc<dyn TenantResolver>,
    roles: Arc<dyn RoleLister>,
    identities: Arc<dyn IdentityLookup>,
    catalog: Arc<dyn RoleCatalog>,
    config: UserServiceConfig,
}

impl UserService {
    pub fn new(
        tenants: Arc<dyn TenantResolver>,
        roles: Arc<dyn RoleLister>,
        identities: Arc<dyn IdentityLookup>,
        catalog: Arc<dyn RoleCatalog>,
        config: UserServiceConfig,
    ) -> Self {
        Self {
            tenants,
            roles,
            identities,
            catalog,
            config,
        }
    }

    /// The caller's profile, or one built from the token claims when the
    /// identity provider has no record.
    #[instrument(skip(self, ctx))]
    pub async fn me(&self, ctx: &RequestContext) -> DomainResult<UserIdentity> {
        let tenant = tenant_of(self.tenants.as_ref(), ctx).await?;
        let email = ctx.caller_email()?;

        if let Some(identity) = self.identities.get(&tenant, email).await? {
            return Ok(identity);
        }

        debug!("caller has no identity record, using token claims");
        let claims = ctx.claims();
        Ok(UserIdentity::new(
            claims.subject.clone(),
            email,
            claims.given_name.clone(),
            claims.family_name.clone(),
        ))
    }

    /// Profile of the user with `email` in the caller's tenant.
    #[instrument(skip(self, ctx))]
    pub async fn user(&self, ctx: &RequestContext, email: &str) -> DomainResult<Option<UserIdentity>> {
        let tenant = tenant_of(self.tenants.as_ref(), ctx).await?;
        self.identities.get(&tenant, email).await
    }

    /// One page of the users holding roles on `resource`.
    #[instrument(skip(self, ctx, role_filters), fields(kind = %resource.kind, name = %resource.name))]
    pub async fn users(
        &self,
        ctx: &RequestContext,
        resource: &ResourceContext,
        role_filters: &[String],
        sort: Option<SortSpec>,
        page: Option<PageSpec>,
    ) -> DomainResult<UserConnection> {
        let tenant = tenant_of(self.tenants.as_ref(), ctx).await?;
        let assignments = self.roles.list_users(&tenant, resource, role_filters).await?;

        let mut list = self.user_roles(&resource.kind, &assignments);
        self.identities.enrich_user_roles(&tenant, &mut list).await;
        sort_user_roles(&mut list, sort, self.config.default_sort);

        let total_count = list.len();
        let (users, page_info) = paginate(&list, page, self.config.page_defaults, total_count);
        debug!(total_count, count = page_info.count, "listed users");

        Ok(UserConnection { users, page_info })
    }

    /// Roles defined for the resource's kind.
    pub async fn roles(
        &self,
        ctx: &RequestContext,
        resource: &ResourceContext,
    ) -> DomainResult<Vec<Role>> {
        tenant_of(self.tenants.as_ref(), ctx).await?;
        Ok(self.catalog.roles_for(&resource.kind))
    }

    #[instrument(skip(self, ctx, changes), fields(kind = %resource.kind, name = %resource.name))]
    pub async fn assign_roles_to_users(
        &self,
        ctx: &RequestContext,
        resource: &ResourceContext,
        changes: &[RoleChange],
    ) -> DomainResult<RoleAssignmentResult> {
        let tenant = tenant_of(self.tenants.as_ref(), ctx).await?;
        self.roles.assign_roles(&tenant, resource, changes).await
    }

    #[instrument(skip(self, ctx, input), fields(kind = %resource.kind, name = %resource.name))]
    pub async fn remove_role(
        &self,
        ctx: &RequestContext,
        resource: &ResourceContext,
        input: &RoleRemovalInput,
    ) -> DomainResult<RoleRemovalResult> {
        let tenant = tenant_of(self.tenants.as_ref(), ctx).await?;
        self.roles.remove_role(&tenant, resource, input).await
    }

    /// Turns role ids into catalog roles. The user id is the email until
    /// enrichment replaces it.
    fn user_roles(&self, kind: &str, assignments: &UserRoleMap) -> Vec<UserRoles> {
        assignments
            .iter()
            .map(|(email, role_ids)| UserRoles {
                user: UserIdentity::from_email(email),
                roles: role_ids
                    .iter()
                    .map(|id| self.catalog.find(kind, id).unwrap_or_else(|| Role::new(id.as_str())))
                    .collect(),
            })
            .collect()
    }
}
