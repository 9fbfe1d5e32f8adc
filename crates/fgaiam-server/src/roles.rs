//! Role assignment listing and mutation.
//!
//! Every role on a resource is an object in the authorization engine:
//!
//! ```text
//! role:<kind>/<clusterId>/<name>/<role>
//! ```
//!
//! A user holds the role when the tuple `user:<email> assignee <role object>`
//! exists. Assigning a role also writes the binding that grants the role's
//! assignees the relation on the resource itself:
//!
//! ```text
//! role:<kind>/<clusterId>/<name>/<role>#assignee  <role>  <kind>:<clusterId>/<name>
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use fgaiam_backends::{AuthorizationEngine, BackendError, ListUsersRequest, ObjectRef, TupleKey, UserRef};
use fgaiam_domain::{
    DomainError, DomainResult, ResourceContext, RoleAssignmentResult, RoleChange,
    RoleRemovalInput, RoleRemovalResult, TenantContext, UserRoleMap,
};
use tracing::{debug, instrument};

use crate::catalog::RoleCatalog;
use crate::store::{is_duplicate_write_error, is_missing_tuple_error, StoreResolver};

/// Relation linking users to a role object.
pub const ASSIGNEE_RELATION: &str = "assignee";
/// Object type of role objects.
pub const ROLE_TYPE: &str = "role";
/// Subject type of users.
pub const USER_TYPE: &str = "user";

/// Lists and changes role assignments on a resource.
#[async_trait]
pub trait RoleLister: Send + Sync {
    /// Users holding any of the effective roles on `resource`.
    ///
    /// With an empty `role_filters` every catalog role is listed; otherwise
    /// the catalog roles named in the filter, in catalog order.
    async fn list_users(
        &self,
        tenant: &TenantContext,
        resource: &ResourceContext,
        role_filters: &[String],
    ) -> DomainResult<UserRoleMap>;

    /// Assigns roles to users. Existing assignments count as assigned.
    async fn assign_roles(
        &self,
        tenant: &TenantContext,
        resource: &ResourceContext,
        changes: &[RoleChange],
    ) -> DomainResult<RoleAssignmentResult>;

    /// Removes one role from one user.
    async fn remove_role(
        &self,
        tenant: &TenantContext,
        resource: &ResourceContext,
        input: &RoleRemovalInput,
    ) -> DomainResult<RoleRemovalResult>;
}

/// [`RoleLister`] backed by the authorization engine.
pub struct RoleListingService {
    engine: Arc<dyn AuthorizationEngine>,
    stores: Arc<dyn StoreResolver>,
    catalog: Arc<dyn RoleCatalog>,
}

impl RoleListingService {
    pub fn new(
        engine: Arc<dyn AuthorizationEngine>,
        stores: Arc<dyn StoreResolver>,
        catalog: Arc<dyn RoleCatalog>,
    ) -> Self {
        Self {
            engine,
            stores,
            catalog,
        }
    }

    fn role_object(tenant: &TenantContext, resource: &ResourceContext, role: &str) -> String {
        format!(
            "{ROLE_TYPE}:{}",
            resource.role_object_id(&tenant.cluster_id, role)
        )
    }

    /// Model id to pin writes to; writes fall back to the engine's latest model.
    async fn current_model(&self, organization: &str) -> Option<String> {
        match self.stores.model_id(organization).await {
            Ok(id) => Some(id),
            Err(e) => {
                debug!(error = %e, "writing without a pinned authorization model");
                None
            }
        }
    }

    async fn write_idempotent(
        &self,
        store_id: &str,
        tuple: TupleKey,
        model_id: Option<&str>,
    ) -> Result<(), BackendError> {
        match self.engine.write(store_id, vec![tuple], vec![], model_id).await {
            Ok(()) => Ok(()),
            Err(e) if is_duplicate_write_error(&e) => {
                debug!("tuple already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn wrap(err: BackendError, action: &str, role: &str, resource: &ResourceContext) -> DomainError {
    DomainError::upstream(
        err.service(),
        format!(
            "{action} role {role} on {}/{}: {err}",
            resource.kind, resource.name
        ),
    )
}

#[async_trait]
impl RoleLister for RoleListingService {
    #[instrument(skip(self, tenant, resource), fields(org = %tenant.organization_name, kind = %resource.kind, name = %resource.name))]
    async fn list_users(
        &self,
        tenant: &TenantContext,
        resource: &ResourceContext,
        role_filters: &[String],
    ) -> DomainResult<UserRoleMap> {
        let store_id = self.stores.store_id(&tenant.organization_name).await?;

        let roles: Vec<_> = self
            .catalog
            .roles_for(&resource.kind)
            .into_iter()
            .filter(|r| role_filters.is_empty() || role_filters.contains(&r.id))
            .collect();

        let mut assignments = UserRoleMap::new();
        for role in &roles {
            let request = ListUsersRequest {
                object: ObjectRef::new(
                    ROLE_TYPE,
                    resource.role_object_id(&tenant.cluster_id, &role.id),
                ),
                relation: ASSIGNEE_RELATION.to_string(),
                user_types: vec![USER_TYPE.to_string()],
                authorization_model_id: None,
            };

            let users = self
                .engine
                .list_users(&store_id, &request)
                .await
                .map_err(|e| wrap(e, "listing assignees of", &role.id, resource))?;

            for user in users {
                match user {
                    UserRef::Object { user_type, id } if user_type == USER_TYPE => {
                        assignments.record(&id, &role.id);
                    }
                    other => debug!(subject = ?other, role = %role.id, "skipping non-user subject"),
                }
            }
        }

        debug!(roles = roles.len(), users = assignments.len(), "listed role assignees");
        Ok(assignments)
    }

    #[instrument(skip(self, tenant, resource, changes), fields(org = %tenant.organization_name, changes = changes.len()))]
    async fn assign_roles(
        &self,
        tenant: &TenantContext,
        resource: &ResourceContext,
        changes: &[RoleChange],
    ) -> DomainResult<RoleAssignmentResult> {
        let store_id = self.stores.store_id(&tenant.organization_name).await?;
        let model_id = self.current_model(&tenant.organization_name).await;
        let resource_object = resource.resource_object(&tenant.cluster_id);

        let mut result = RoleAssignmentResult::default();
        for change in changes {
            if change.user_id.trim().is_empty() {
                result.errors.push("user id must not be empty".to_string());
                continue;
            }

            for role in &change.roles {
                if self.catalog.find(&resource.kind, role).is_none() {
                    result.errors.push(format!(
                        "role '{role}' is not defined for {} (user {})",
                        resource.kind, change.user_id
                    ));
                    continue;
                }

                let role_object = Self::role_object(tenant, resource, role);
                let assignee = TupleKey::new(
                    format!("{USER_TYPE}:{}", change.user_id),
                    ASSIGNEE_RELATION,
                    role_object.clone(),
                );
                let binding = TupleKey::new(
                    format!("{role_object}#{ASSIGNEE_RELATION}"),
                    role.clone(),
                    resource_object.clone(),
                );

                for tuple in [assignee, binding] {
                    self.write_idempotent(&store_id, tuple, model_id.as_deref())
                        .await
                        .map_err(|e| wrap(e, "assigning", role, resource))?;
                }
                result.assigned_count += 1;
            }
        }

        result.success = result.errors.is_empty();
        Ok(result)
    }

    #[instrument(skip(self, tenant, resource), fields(org = %tenant.organization_name))]
    async fn remove_role(
        &self,
        tenant: &TenantContext,
        resource: &ResourceContext,
        input: &RoleRemovalInput,
    ) -> DomainResult<RoleRemovalResult> {
        if self.catalog.find(&resource.kind, &input.role).is_none() {
            return Ok(RoleRemovalResult {
                success: false,
                was_assigned: false,
                error: Some(format!(
                    "role '{}' is not defined for {}",
                    input.role, resource.kind
                )),
            });
        }

        let store_id = self.stores.store_id(&tenant.organization_name).await?;
        let model_id = self.current_model(&tenant.organization_name).await;
        let tuple = TupleKey::new(
            format!("{USER_TYPE}:{}", input.user_id),
            ASSIGNEE_RELATION,
            Self::role_object(tenant, resource, &input.role),
        );

        match self
            .engine
            .write(&store_id, vec![], vec![tuple], model_id.as_deref())
            .await
        {
            Ok(()) => Ok(RoleRemovalResult {
                success: true,
                was_assigned: true,
                error: None,
            }),
            Err(e) if is_missing_tuple_error(&e) => Ok(RoleRemovalResult {
                success: true,
                was_assigned: false,
                error: None,
            }),
            Err(e) => Err(wrap(e, "removing", &input.role, resource)),
        }
    }
}
