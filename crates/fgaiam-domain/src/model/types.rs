//! Core type definitions for tenant-aware role listing.

use serde::{Deserialize, Serialize};

/// Verified tenant identity derived from a request's bearer token.
///
/// Resolved once per request and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantContext {
    /// Identity-provider realm the token was issued by.
    pub idm_tenant: String,
    /// Durable control-plane cluster id of the organization workspace.
    pub cluster_id: String,
    /// Organization name; also the authorization store name.
    pub organization_name: String,
}

impl TenantContext {
    /// Creates a new tenant context.
    pub fn new(
        idm_tenant: impl Into<String>,
        cluster_id: impl Into<String>,
        organization_name: impl Into<String>,
    ) -> Self {
        Self {
            idm_tenant: idm_tenant.into(),
            cluster_id: cluster_id.into(),
            organization_name: organization_name.into(),
        }
    }
}

/// The resource whose role assignments are listed or changed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContext {
    /// Resource kind, used as the first object-id segment (e.g. "account").
    pub kind: String,
    /// Resource name.
    pub name: String,
    /// Optional namespace for namespaced resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceContext {
    /// Creates a cluster-scoped resource context.
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }

    /// Sets the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Object id of the role object for `role` on this resource:
    /// `<kind>/<cluster_id>/<name>/<role>`.
    pub fn role_object_id(&self, cluster_id: &str, role: &str) -> String {
        format!("{}/{}/{}/{}", self.kind, cluster_id, self.name, role)
    }

    /// Object of the resource itself in the authorization engine:
    /// `<kind>:<cluster_id>/<name>`.
    pub fn resource_object(&self, cluster_id: &str) -> String {
        format!("{}:{}/{}", self.kind, cluster_id, self.name)
    }
}

/// Identity-provider profile of a user.
///
/// Before enrichment only `email` is authoritative; `user_id` holds the
/// authorization-engine subject id until the identity provider supplies one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub user_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl UserIdentity {
    /// Creates an identity known only by email.
    pub fn from_email(email: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            user_id: email.clone(),
            email,
            first_name: None,
            last_name: None,
        }
    }

    /// Creates a fully populated identity.
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            first_name,
            last_name,
        }
    }

    /// Copies identity-provider fields from `profile`, keeping `email`.
    pub fn merge_profile(&mut self, profile: &UserIdentity) {
        self.user_id = profile.user_id.clone();
        self.first_name = profile.first_name.clone();
        self.last_name = profile.last_name.clone();
    }
}

/// A role defined for a resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// Technical id, used as the last object-id segment (e.g. "owner").
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
}

impl Role {
    /// Creates a role whose display name equals its id.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            description: String::new(),
        }
    }
}

/// A user together with every role it holds on one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoles {
    pub user: UserIdentity,
    /// Never empty: a user only appears after matching at least one role.
    pub roles: Vec<Role>,
}

/// Page metadata for a listed slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub count: usize,
    pub total_count: usize,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

/// A page of users with roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConnection {
    pub users: Vec<UserRoles>,
    pub page_info: PageInfo,
}

/// Field to order listed users by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    UserId,
    #[default]
    Email,
    FirstName,
    LastName,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Requested ordering of listed users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }
}

/// Requested page. Non-positive or absent values fall back to defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpec {
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

impl PageSpec {
    pub fn new(limit: i64, page: i64) -> Self {
        Self {
            limit: Some(limit),
            page: Some(page),
        }
    }
}

/// Roles to grant to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleChange {
    /// Authorization-engine subject id (the user's email).
    pub user_id: String,
    pub roles: Vec<String>,
}

/// Outcome of a batch role assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignmentResult {
    pub success: bool,
    pub assigned_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// A single role to revoke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRemovalInput {
    pub user_id: String,
    pub role: String,
}

/// Outcome of a role removal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRemovalResult {
    pub success: bool,
    /// False when the assignment did not exist.
    pub was_assigned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
