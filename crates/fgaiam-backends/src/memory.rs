//! In-memory backend for testing.
//!
//! Implements all three backend traits over `DashMap`s so services can be
//! exercised without external systems. Besides seeding helpers it exposes
//! per-operation call counters and failure injection.
//!
//! Engine semantics are deliberately narrow: `list_users` and `check` only
//! consider directly stored tuples (no rewrite evaluation).

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tracing::instrument;

use crate::error::{
    BackendError, BackendResult, CONTROL_PLANE, KEYCLOAK, OPENFGA, WRITE_FAILED_CODE,
};
use crate::traits::{
    Account, AuthorizationEngine, AuthorizationModelRef, ControlPlane, IdentityProvider,
    IdentityRecord, ListUsersRequest, StorePage, StoreRef, TupleKey, UserRef, Workspace,
};

/// In-memory implementation of every backend trait.
#[derive(Debug)]
pub struct MemoryBackend {
    /// Stores in creation order.
    stores: std::sync::RwLock<Vec<StoreRef>>,
    /// Models per store, newest first.
    models: DashMap<String, Vec<AuthorizationModelRef>>,
    /// Tuples per store, in write order.
    tuples: DashMap<String, Vec<TupleKey>>,
    /// Identity records per realm.
    identities: DashMap<String, Vec<IdentityRecord>>,
    /// Accounts keyed by `(cluster, name)`.
    accounts: DashMap<(String, String), Account>,
    /// Workspaces keyed by `(cluster, name)`.
    workspaces: DashMap<(String, String), Workspace>,

    store_page_size: AtomicUsize,

    list_stores_calls: AtomicUsize,
    read_models_calls: AtomicUsize,
    list_users_calls: AtomicUsize,
    write_calls: AtomicUsize,
    check_calls: AtomicUsize,
    identity_calls: AtomicUsize,
    control_plane_calls: AtomicUsize,

    failing_emails: DashSet<String>,
    fail_list_users: AtomicBool,
    fail_writes: AtomicBool,
    fail_checks: AtomicBool,
    fail_control_plane: AtomicBool,
    identity_delay_ms: AtomicU64,

    identity_in_flight: AtomicUsize,
    identity_max_in_flight: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            stores: std::sync::RwLock::new(Vec::new()),
            models: DashMap::new(),
            tuples: DashMap::new(),
            identities: DashMap::new(),
            accounts: DashMap::new(),
            workspaces: DashMap::new(),
            store_page_size: AtomicUsize::new(50),
            list_stores_calls: AtomicUsize::new(0),
            read_models_calls: AtomicUsize::new(0),
            list_users_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
            check_calls: AtomicUsize::new(0),
            identity_calls: AtomicUsize::new(0),
            control_plane_calls: AtomicUsize::new(0),
            failing_emails: DashSet::new(),
            fail_list_users: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_checks: AtomicBool::new(false),
            fail_control_plane: AtomicBool::new(false),
            identity_delay_ms: AtomicU64::new(0),
            identity_in_flight: AtomicUsize::new(0),
            identity_max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new backend wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    pub fn add_store(&self, id: impl Into<String>, name: impl Into<String>) {
        let store = StoreRef {
            id: id.into(),
            name: name.into(),
        };
        self.tuples.entry(store.id.clone()).or_default();
        if let Ok(mut stores) = self.stores.write() {
            stores.push(store);
        }
    }

    /// Adds a model; the most recently added model is listed first.
    pub fn add_model(&self, store_id: &str, model_id: impl Into<String>) {
        self.models
            .entry(store_id.to_string())
            .or_default()
            .insert(
                0,
                AuthorizationModelRef {
                    id: model_id.into(),
                    schema_version: "1.1".to_string(),
                },
            );
    }

    /// Stores a tuple without duplicate checks.
    pub fn add_tuple(&self, store_id: &str, tuple: TupleKey) {
        self.tuples.entry(store_id.to_string()).or_default().push(tuple);
    }

    pub fn add_identity(&self, realm: &str, record: IdentityRecord) {
        self.identities
            .entry(realm.to_string())
            .or_default()
            .push(record);
    }

    pub fn add_account(&self, cluster: &str, account: Account) {
        self.accounts
            .insert((cluster.to_string(), account.name.clone()), account);
    }

    pub fn add_workspace(&self, cluster: &str, workspace: Workspace) {
        self.workspaces
            .insert((cluster.to_string(), workspace.name.clone()), workspace);
    }

    /// Snapshot of the tuples of a store.
    pub fn tuples(&self, store_id: &str) -> Vec<TupleKey> {
        self.tuples
            .get(store_id)
            .map(|t| t.value().clone())
            .unwrap_or_default()
    }

    /// Sets how many stores one `list_stores` page returns.
    pub fn set_store_page_size(&self, size: usize) {
        self.store_page_size.store(size.max(1), Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Failure injection
    // ------------------------------------------------------------------

    /// Makes identity lookups for `email` fail.
    pub fn fail_identity_for(&self, email: impl Into<String>) {
        self.failing_emails.insert(email.into());
    }

    pub fn set_fail_list_users(&self, fail: bool) {
        self.fail_list_users.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_checks(&self, fail: bool) {
        self.fail_checks.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_control_plane(&self, fail: bool) {
        self.fail_control_plane.store(fail, Ordering::SeqCst);
    }

    /// Delays every identity lookup.
    pub fn set_identity_delay(&self, delay: Duration) {
        self.identity_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------
    // Counters
    // ------------------------------------------------------------------

    pub fn list_stores_calls(&self) -> usize {
        self.list_stores_calls.load(Ordering::SeqCst)
    }

    pub fn read_models_calls(&self) -> usize {
        self.read_models_calls.load(Ordering::SeqCst)
    }

    pub fn list_users_calls(&self) -> usize {
        self.list_users_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    pub fn identity_calls(&self) -> usize {
        self.identity_calls.load(Ordering::SeqCst)
    }

    pub fn control_plane_calls(&self) -> usize {
        self.control_plane_calls.load(Ordering::SeqCst)
    }

    /// Highest number of identity lookups observed in flight at once.
    pub fn max_identity_in_flight(&self) -> usize {
        self.identity_max_in_flight.load(Ordering::SeqCst)
    }

    fn require_store(&self, store_id: &str) -> BackendResult<()> {
        if self.tuples.contains_key(store_id) {
            Ok(())
        } else {
            Err(BackendError::Engine {
                status: 404,
                code: "store_id_not_found".to_string(),
                message: format!("store {store_id} not found"),
            })
        }
    }
}

/// Decrements the in-flight counter when a lookup finishes or is dropped.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn unavailable(service: &'static str) -> BackendError {
    BackendError::Status {
        service,
        status: 503,
        body: "injected failure".to_string(),
    }
}

fn describe(tuple: &TupleKey) -> String {
    format!(
        "user: '{}', relation: '{}', object: '{}'",
        tuple.user, tuple.relation, tuple.object
    )
}

/// Parses a stored subject into a typed user reference.
fn parse_user(user: &str) -> Option<UserRef> {
    let (user_type, rest) = user.split_once(':')?;
    if rest == "*" {
        return Some(UserRef::Wildcard {
            user_type: user_type.to_string(),
        });
    }
    match rest.split_once('#') {
        Some((id, relation)) => Some(UserRef::Userset {
            user_type: user_type.to_string(),
            id: id.to_string(),
            relation: relation.to_string(),
        }),
        None => Some(UserRef::Object {
            user_type: user_type.to_string(),
            id: rest.to_string(),
        }),
    }
}

fn object_matches(filter: &str, object: &str) -> bool {
    if filter.is_empty() {
        return true;
    }
    if filter.ends_with(':') {
        return object.starts_with(filter);
    }
    filter == object
}

#[async_trait]
impl AuthorizationEngine for MemoryBackend {
    async fn list_stores(&self, continuation_token: Option<&str>) -> BackendResult<StorePage> {
        self.list_stores_calls.fetch_add(1, Ordering::SeqCst);

        let offset = match continuation_token {
            Some(token) => token.parse::<usize>().map_err(|_| BackendError::Engine {
                status: 400,
                code: "invalid_continuation_token".to_string(),
                message: format!("invalid continuation token: {token}"),
            })?,
            None => 0,
        };
        let page_size = self.store_page_size.load(Ordering::SeqCst);

        let stores = self
            .stores
            .read()
            .map(|s| s.clone())
            .unwrap_or_default();
        let end = (offset + page_size).min(stores.len());
        let page = stores.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();

        Ok(StorePage {
            stores: page,
            continuation_token: (end < stores.len()).then(|| end.to_string()),
        })
    }

    async fn read_authorization_models(
        &self,
        store_id: &str,
    ) -> BackendResult<Vec<AuthorizationModelRef>> {
        self.read_models_calls.fetch_add(1, Ordering::SeqCst);
        self.require_store(store_id)?;
        Ok(self
            .models
            .get(store_id)
            .map(|m| m.value().clone())
            .unwrap_or_default())
    }

    #[instrument(skip(self, request))]
    async fn list_users(
        &self,
        store_id: &str,
        request: &ListUsersRequest,
    ) -> BackendResult<Vec<UserRef>> {
        self.list_users_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list_users.load(Ordering::SeqCst) {
            return Err(unavailable(OPENFGA));
        }
        self.require_store(store_id)?;

        let object = request.object.to_object_string();
        let tuples = self.tuples(store_id);
        Ok(tuples
            .iter()
            .filter(|t| t.object == object && t.relation == request.relation)
            .filter_map(|t| parse_user(&t.user))
            .filter(|u| {
                let user_type = match u {
                    UserRef::Object { user_type, .. }
                    | UserRef::Userset { user_type, .. }
                    | UserRef::Wildcard { user_type } => user_type,
                };
                request.user_types.is_empty() || request.user_types.contains(user_type)
            })
            .collect())
    }

    #[instrument(skip(self, writes, deletes))]
    async fn write(
        &self,
        store_id: &str,
        writes: Vec<TupleKey>,
        deletes: Vec<TupleKey>,
        _authorization_model_id: Option<&str>,
    ) -> BackendResult<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(unavailable(OPENFGA));
        }
        self.require_store(store_id)?;

        let mut entry = self.tuples.entry(store_id.to_string()).or_default();
        let stored = entry.value_mut();

        // Validate the whole batch first so a rejected write changes nothing.
        for tuple in &writes {
            if stored.contains(tuple) {
                return Err(BackendError::Engine {
                    status: 400,
                    code: WRITE_FAILED_CODE.to_string(),
                    message: format!(
                        "cannot write a tuple which already exists: {}",
                        describe(tuple)
                    ),
                });
            }
        }
        for tuple in &deletes {
            if !stored.contains(tuple) {
                return Err(BackendError::Engine {
                    status: 400,
                    code: WRITE_FAILED_CODE.to_string(),
                    message: format!(
                        "cannot delete a tuple which does not exist: {}",
                        describe(tuple)
                    ),
                });
            }
        }

        stored.retain(|t| !deletes.contains(t));
        stored.extend(writes);
        Ok(())
    }

    async fn read(&self, store_id: &str, filter: &TupleKey) -> BackendResult<Vec<TupleKey>> {
        self.require_store(store_id)?;
        Ok(self
            .tuples(store_id)
            .into_iter()
            .filter(|t| filter.user.is_empty() || t.user == filter.user)
            .filter(|t| filter.relation.is_empty() || t.relation == filter.relation)
            .filter(|t| object_matches(&filter.object, &t.object))
            .collect())
    }

    #[instrument(skip(self))]
    async fn check(
        &self,
        store_id: &str,
        tuple: &TupleKey,
        _authorization_model_id: Option<&str>,
    ) -> BackendResult<bool> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_checks.load(Ordering::SeqCst) {
            return Err(unavailable(OPENFGA));
        }
        self.require_store(store_id)?;

        let wildcard = tuple
            .user
            .split_once(':')
            .map(|(user_type, _)| format!("{user_type}:*"));
        Ok(self.tuples(store_id).iter().any(|t| {
            t.object == tuple.object
                && t.relation == tuple.relation
                && (t.user == tuple.user || Some(&t.user) == wildcard.as_ref())
        }))
    }
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    /// Matches emails case-insensitively, like Keycloak's exact search, and
    /// returns every match so callers can observe duplicates.
    async fn find_users_by_email(
        &self,
        realm: &str,
        email: &str,
    ) -> BackendResult<Vec<IdentityRecord>> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.identity_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.identity_in_flight);
        self.identity_max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.identity_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.failing_emails.contains(email) {
            return Err(unavailable(KEYCLOAK));
        }

        Ok(self
            .identities
            .get(realm)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| {
                        r.email
                            .as_deref()
                            .is_some_and(|e| e.eq_ignore_ascii_case(email))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ControlPlane for MemoryBackend {
    async fn get_account(&self, cluster: &str, name: &str) -> BackendResult<Option<Account>> {
        self.control_plane_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_control_plane.load(Ordering::SeqCst) {
            return Err(unavailable(CONTROL_PLANE));
        }
        Ok(self
            .accounts
            .get(&(cluster.to_string(), name.to_string()))
            .map(|a| a.value().clone()))
    }

    async fn get_workspace(&self, cluster: &str, name: &str) -> BackendResult<Option<Workspace>> {
        self.control_plane_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_control_plane.load(Ordering::SeqCst) {
            return Err(unavailable(CONTROL_PLANE));
        }
        Ok(self
            .workspaces
            .get(&(cluster.to_string(), name.to_string()))
            .map(|w| w.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ObjectRef;

    fn assignee(user: &str, object: &str) -> TupleKey {
        TupleKey::new(user, "assignee", object)
    }

    #[tokio::test]
    async fn test_list_stores_follows_pages() {
        let backend = MemoryBackend::new();
        for i in 0..5 {
            backend.add_store(format!("s{i}"), format!("org-{i}"));
        }
        backend.set_store_page_size(2);

        let first = backend.list_stores(None).await.unwrap();
        assert_eq!(first.stores.len(), 2);
        assert_eq!(first.continuation_token.as_deref(), Some("2"));

        let last = backend.list_stores(Some("4")).await.unwrap();
        assert_eq!(last.stores[0].name, "org-4");
        assert_eq!(last.continuation_token, None);
        assert_eq!(backend.list_stores_calls(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_write_is_rejected_atomically() {
        let backend = MemoryBackend::new();
        backend.add_store("s1", "acme");
        let existing = assignee("user:a@x.io", "role:account/c/app/owner");
        backend.add_tuple("s1", existing.clone());

        let fresh = assignee("user:b@x.io", "role:account/c/app/owner");
        let err = backend
            .write("s1", vec![fresh, existing], vec![], None)
            .await
            .unwrap_err();

        match err {
            BackendError::Engine { code, message, .. } => {
                assert_eq!(code, WRITE_FAILED_CODE);
                assert!(message.contains("already exists"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(backend.tuples("s1").len(), 1);
    }

    #[tokio::test]
    async fn test_delete_of_missing_tuple_is_rejected() {
        let backend = MemoryBackend::new();
        backend.add_store("s1", "acme");

        let err = backend
            .write("s1", vec![], vec![assignee("user:a", "role:r")], None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_list_users_filters_by_object_relation_and_type() {
        let backend = MemoryBackend::new();
        backend.add_store("s1", "acme");
        backend.add_tuple("s1", assignee("user:a@x.io", "role:account/c/app/owner"));
        backend.add_tuple("s1", assignee("team:eng#member", "role:account/c/app/owner"));
        backend.add_tuple("s1", assignee("user:b@x.io", "role:account/c/app/member"));

        let request = ListUsersRequest {
            object: ObjectRef::new("role", "account/c/app/owner"),
            relation: "assignee".to_string(),
            user_types: vec!["user".to_string()],
            authorization_model_id: None,
        };
        let users = backend.list_users("s1", &request).await.unwrap();

        assert_eq!(
            users,
            vec![UserRef::Object {
                user_type: "user".to_string(),
                id: "a@x.io".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_check_honours_wildcards_and_injected_failures() {
        let backend = MemoryBackend::new();
        backend.add_store("s1", "acme");
        backend.add_tuple("s1", TupleKey::new("user:*", "viewer", "doc:readme"));

        let query = TupleKey::new("user:a@x.io", "viewer", "doc:readme");
        assert!(backend.check("s1", &query, None).await.unwrap());

        backend.set_fail_checks(true);
        assert!(backend.check("s1", &query, None).await.is_err());
    }

    #[tokio::test]
    async fn test_identity_search_is_case_insensitive_and_realm_scoped() {
        let backend = MemoryBackend::new();
        backend.add_identity(
            "acme",
            IdentityRecord {
                id: "u-1".to_string(),
                email: Some("Ada@Example.com".to_string()),
                first_name: None,
                last_name: None,
            },
        );

        let found = backend
            .find_users_by_email("acme", "ada@example.com")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let other_realm = backend
            .find_users_by_email("globex", "ada@example.com")
            .await
            .unwrap();
        assert!(other_realm.is_empty());
    }

    #[tokio::test]
    async fn test_read_matches_type_prefix() {
        let backend = MemoryBackend::new();
        backend.add_store("s1", "acme");
        backend.add_tuple("s1", assignee("user:a", "role:x"));
        backend.add_tuple("s1", assignee("user:a", "doc:y"));

        let filter = TupleKey::new("user:a", "", "role:");
        let tuples = backend.read("s1", &filter).await.unwrap();
        assert_eq!(tuples, vec![assignee("user:a", "role:x")]);
    }
}
