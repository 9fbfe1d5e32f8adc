//! Backend trait definitions.
//!
//! Each external system the pipeline talks to is one trait. Implementations
//! must be thread-safe (Send + Sync) and are shared behind `Arc` by the
//! server crate.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::BackendResult;

// ============================================================
// Authorization engine
// ============================================================

/// Store metadata returned by `ListStores`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRef {
    pub id: String,
    pub name: String,
}

/// One page of `ListStores`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorePage {
    pub stores: Vec<StoreRef>,
    /// Present when more stores are available.
    pub continuation_token: Option<String>,
}

/// Authorization model metadata returned by `ReadAuthorizationModels`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationModelRef {
    pub id: String,
    pub schema_version: String,
}

/// A relationship tuple key: `user` is `relation` of `object`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleKey {
    /// Subject, e.g. `user:alice@example.com` or `role:x#assignee`.
    pub user: String,
    pub relation: String,
    /// Object, e.g. `role:account/1mxz9/team-a/owner`.
    pub object: String,
}

impl TupleKey {
    pub fn new(
        user: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            relation: relation.into(),
            object: object.into(),
        }
    }
}

/// Typed object reference (`{type, id}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub object_type: String,
    pub id: String,
}

impl ObjectRef {
    pub fn new(object_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            id: id.into(),
        }
    }

    /// `type:id` form used in tuple keys.
    pub fn to_object_string(&self) -> String {
        format!("{}:{}", self.object_type, self.id)
    }
}

/// Relationship-listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListUsersRequest {
    pub object: ObjectRef,
    pub relation: String,
    /// Subject types to return (e.g. `["user"]`).
    pub user_types: Vec<String>,
    pub authorization_model_id: Option<String>,
}

/// A subject returned by relationship listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRef {
    /// A concrete subject, e.g. `user:alice@example.com`.
    Object { user_type: String, id: String },
    /// A userset, e.g. `team:eng#member`.
    Userset {
        user_type: String,
        id: String,
        relation: String,
    },
    /// Every subject of a type (`user:*`).
    Wildcard { user_type: String },
}

/// Client for the relationship-based authorization engine.
#[async_trait]
pub trait AuthorizationEngine: Send + Sync {
    /// Lists one page of stores.
    async fn list_stores(&self, continuation_token: Option<&str>) -> BackendResult<StorePage>;

    /// Lists authorization models of a store in the engine's order.
    async fn read_authorization_models(
        &self,
        store_id: &str,
    ) -> BackendResult<Vec<AuthorizationModelRef>>;

    /// Lists subjects holding `relation` on `object`.
    async fn list_users(
        &self,
        store_id: &str,
        request: &ListUsersRequest,
    ) -> BackendResult<Vec<UserRef>>;

    /// Writes and deletes tuples in one transaction.
    async fn write(
        &self,
        store_id: &str,
        writes: Vec<TupleKey>,
        deletes: Vec<TupleKey>,
        authorization_model_id: Option<&str>,
    ) -> BackendResult<()>;

    /// Reads stored tuples matching `filter`. Empty `user`/`relation`
    /// fields match anything; `object` may be a bare type (`role:`).
    async fn read(&self, store_id: &str, filter: &TupleKey) -> BackendResult<Vec<TupleKey>>;

    /// Decides whether `tuple.user` has `tuple.relation` on `tuple.object`.
    async fn check(
        &self,
        store_id: &str,
        tuple: &TupleKey,
        authorization_model_id: Option<&str>,
    ) -> BackendResult<bool>;
}

// ============================================================
// Identity provider
// ============================================================

/// A user record from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Client for the identity provider's user directory.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Searches `realm` for users with the given email (exact search, at most
    /// one result requested). Callers must still verify the match.
    async fn find_users_by_email(
        &self,
        realm: &str,
        email: &str,
    ) -> BackendResult<Vec<IdentityRecord>>;
}

// ============================================================
// Control plane
// ============================================================

/// Annotation carrying a workspace's logical cluster id.
pub const CLUSTER_ANNOTATION: &str = "kcp.io/cluster";

/// An account object (`spec.type` is `"org"` for organizations).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub account_type: String,
}

/// A workspace object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workspace {
    pub name: String,
    /// `spec.cluster`, when populated.
    pub cluster: Option<String>,
    pub annotations: BTreeMap<String, String>,
}

impl Workspace {
    /// Durable cluster id: `spec.cluster`, else the cluster annotation.
    pub fn cluster_id(&self) -> Option<&str> {
        self.cluster
            .as_deref()
            .filter(|c| !c.is_empty())
            .or_else(|| {
                self.annotations
                    .get(CLUSTER_ANNOTATION)
                    .map(String::as_str)
                    .filter(|c| !c.is_empty())
            })
    }
}

/// Client for a multi-cluster control plane.
///
/// Every call names the logical cluster it is addressed to.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Gets an account by name; `None` when it does not exist.
    async fn get_account(&self, cluster: &str, name: &str) -> BackendResult<Option<Account>>;

    /// Gets a workspace by name; `None` when it does not exist.
    async fn get_workspace(&self, cluster: &str, name: &str) -> BackendResult<Option<Workspace>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_prefers_spec_cluster() {
        let mut annotations = BTreeMap::new();
        annotations.insert(CLUSTER_ANNOTATION.to_string(), "from-annotation".to_string());
        let workspace = Workspace {
            name: "acme".to_string(),
            cluster: Some("from-spec".to_string()),
            annotations,
        };

        assert_eq!(workspace.cluster_id(), Some("from-spec"));
    }

    #[test]
    fn test_workspace_falls_back_to_annotation() {
        let mut annotations = BTreeMap::new();
        annotations.insert(CLUSTER_ANNOTATION.to_string(), "1mxz9".to_string());
        let workspace = Workspace {
            name: "acme".to_string(),
            cluster: Some(String::new()),
            annotations,
        };

        assert_eq!(workspace.cluster_id(), Some("1mxz9"));
        assert_eq!(Workspace::default().cluster_id(), None);
    }

    #[test]
    fn test_object_ref_string_form() {
        let object = ObjectRef::new("role", "account/c1/app/owner");
        assert_eq!(object.to_object_string(), "role:account/c1/app/owner");
    }
}
