//! Identity enrichment.
//!
//! Resolves emails to identity-provider profiles. Profiles are cached per
//! realm under `<realm>:<email>`, so identical emails in different tenants
//! never share an entry.
//!
//! Batch lookups check the cache first and fetch the misses concurrently,
//! with at most `max_concurrent_lookups` requests in flight. A lookup that
//! fails or exceeds `lookup_timeout` is logged and left out of the result.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fgaiam_backends::{IdentityProvider, IdentityRecord};
use fgaiam_domain::{DomainError, DomainResult, TenantContext, TtlCache, TtlCacheConfig, UserIdentity, UserRoles};
use futures::stream::{self, StreamExt};
use tracing::{debug, instrument, warn};

use crate::errors::upstream_error;

/// Resolves emails to identity-provider profiles.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Profile of the user with exactly this email in the tenant's realm.
    async fn get(&self, tenant: &TenantContext, email: &str) -> DomainResult<Option<UserIdentity>>;

    /// Profiles of every email that could be resolved. Never fails because
    /// of individual lookups.
    async fn get_many(
        &self,
        tenant: &TenantContext,
        emails: &[String],
    ) -> HashMap<String, UserIdentity>;

    /// Replaces `user_id`, `first_name` and `last_name` of each entry with
    /// the provider's values. Emails are left untouched.
    async fn enrich_user_roles(&self, tenant: &TenantContext, users: &mut [UserRoles]);
}

/// Fan-out settings of [`IdentityEnrichmentService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityEnrichmentConfig {
    /// Lookups allowed in flight per batch.
    pub max_concurrent_lookups: usize,
    /// Time budget of a single lookup.
    pub lookup_timeout: Duration,
}

impl Default for IdentityEnrichmentConfig {
    fn default() -> Self {
        Self {
            max_concurrent_lookups: 10,
            lookup_timeout: Duration::from_secs(5),
        }
    }
}

impl IdentityEnrichmentConfig {
    pub fn with_max_concurrent_lookups(mut self, max: usize) -> Self {
        self.max_concurrent_lookups = max;
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }
}

/// [`IdentityLookup`] backed by an identity provider and a TTL cache.
pub struct IdentityEnrichmentService {
    provider: Arc<dyn IdentityProvider>,
    cache: TtlCache<String, UserIdentity>,
    config: IdentityEnrichmentConfig,
}

impl IdentityEnrichmentService {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        cache_config: TtlCacheConfig,
        config: IdentityEnrichmentConfig,
    ) -> Self {
        Self {
            provider,
            cache: TtlCache::new("identity", cache_config),
            config,
        }
    }

    /// Queries the provider without touching the cache.
    async fn fetch(&self, realm: &str, email: &str) -> DomainResult<Option<UserIdentity>> {
        let records = self
            .provider
            .find_users_by_email(realm, email)
            .await
            .map_err(|e| upstream_error(&e))?;

        // The provider's email search ignores case; only exact matches count.
        let mut matches: Vec<IdentityRecord> = records
            .into_iter()
            .filter(|r| r.email.as_deref() == Some(email))
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => {
                let record = matches.remove(0);
                Ok(Some(UserIdentity::new(
                    record.id,
                    email,
                    record.first_name,
                    record.last_name,
                )))
            }
            n => Err(DomainError::upstream(
                "keycloak",
                format!("data inconsistency: {n} users in realm {realm} share the email {email}"),
            )),
        }
    }
}

fn cache_key(realm: &str, email: &str) -> String {
    format!("{realm}:{email}")
}

#[async_trait]
impl IdentityLookup for IdentityEnrichmentService {
    #[instrument(skip(self, tenant), fields(realm = %tenant.idm_tenant))]
    async fn get(&self, tenant: &TenantContext, email: &str) -> DomainResult<Option<UserIdentity>> {
        let realm = tenant.idm_tenant.as_str();
        let key = cache_key(realm, email);
        if let Some(identity) = self.cache.get(&key).await {
            return Ok(Some(identity));
        }

        let identity = self.fetch(realm, email).await?;
        if let Some(identity) = &identity {
            self.cache.insert(key, identity.clone()).await;
        }
        Ok(identity)
    }

    #[instrument(skip(self, tenant, emails), fields(realm = %tenant.idm_tenant, requested = emails.len()))]
    async fn get_many(
        &self,
        tenant: &TenantContext,
        emails: &[String],
    ) -> HashMap<String, UserIdentity> {
        let realm = tenant.idm_tenant.as_str();
        let mut found = HashMap::new();
        let mut misses = Vec::new();
        let mut seen = HashSet::new();

        for email in emails {
            if !seen.insert(email.as_str()) {
                continue;
            }
            match self.cache.get(&cache_key(realm, email)).await {
                Some(identity) => {
                    found.insert(email.clone(), identity);
                }
                None => misses.push(email.clone()),
            }
        }

        if misses.is_empty() {
            return found;
        }

        let hits = found.len();
        let timeout = self.config.lookup_timeout;
        let outcomes: Vec<_> = stream::iter(misses)
            .map(|email| async move {
                let outcome = tokio::time::timeout(timeout, self.fetch(realm, &email)).await;
                (email, outcome)
            })
            .buffer_unordered(self.config.max_concurrent_lookups.max(1))
            .collect()
            .await;

        let mut fetched = Vec::new();
        for (email, outcome) in outcomes {
            match outcome {
                Ok(Ok(Some(identity))) => fetched.push((email, identity)),
                Ok(Ok(None)) => debug!(email = %email, "no identity for email"),
                Ok(Err(e)) => warn!(email = %email, error = %e, "identity lookup failed"),
                Err(_) => warn!(
                    email = %email,
                    timeout_ms = timeout.as_millis() as u64,
                    "identity lookup timed out"
                ),
            }
        }

        let entries: Vec<(String, UserIdentity)> = fetched
            .iter()
            .map(|(email, identity)| (cache_key(realm, email), identity.clone()))
            .collect();
        self.cache.insert_many(entries).await;
        found.extend(fetched);

        debug!(hits, resolved = found.len(), "enriched identities");
        found
    }

    async fn enrich_user_roles(&self, tenant: &TenantContext, users: &mut [UserRoles]) {
        if users.is_empty() {
            return;
        }

        let emails: Vec<String> = users.iter().map(|u| u.user.email.clone()).collect();
        let profiles = self.get_many(tenant, &emails).await;

        for entry in users.iter_mut() {
            if let Some(profile) = profiles.get(&entry.user.email) {
                entry.user.merge_profile(profile);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fgaiam_backends::MemoryBackend;
    use fgaiam_domain::Role;

    fn tenant(realm: &str) -> TenantContext {
        TenantContext::new(realm, "1mxz9", realm)
    }

    fn record(id: &str, email: &str, first: &str, last: &str) -> IdentityRecord {
        IdentityRecord {
            id: id.to_string(),
            email: Some(email.to_string()),
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
        }
    }

    fn service(backend: Arc<MemoryBackend>) -> IdentityEnrichmentService {
        IdentityEnrichmentService::new(
            backend,
            TtlCacheConfig::default(),
            IdentityEnrichmentConfig::default(),
        )
    }

    fn emails(list: &[&str]) -> Vec<String> {
        list.iter().map(|e| e.to_string()).collect()
    }

    // ============================================================
    // Single lookups
    // ============================================================

    #[tokio::test]
    async fn test_get_caches_found_identity() {
        let backend = MemoryBackend::new_shared();
        backend.add_identity("acme", record("u-1", "ada@acme.io", "Ada", "Lovelace"));
        let service = service(backend.clone());

        let first = service.get(&tenant("acme"), "ada@acme.io").await.unwrap();
        let second = service.get(&tenant("acme"), "ada@acme.io").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.unwrap().user_id, "u-1");
        assert_eq!(backend.identity_calls(), 1);
    }

    #[tokio::test]
    async fn test_get_miss_is_not_cached() {
        let backend = MemoryBackend::new_shared();
        let service = service(backend.clone());

        assert_eq!(service.get(&tenant("acme"), "nobody@acme.io").await.unwrap(), None);
        assert_eq!(service.get(&tenant("acme"), "nobody@acme.io").await.unwrap(), None);
        assert_eq!(backend.identity_calls(), 2);
    }

    /// Test: identical emails in different realms are cached separately
    #[tokio::test]
    async fn test_cache_is_isolated_per_tenant() {
        let backend = MemoryBackend::new_shared();
        backend.add_identity("acme", record("acme-1", "ada@shared.io", "Ada", "Acme"));
        backend.add_identity("globex", record("globex-1", "ada@shared.io", "Ada", "Globex"));
        let service = service(backend.clone());

        let acme = service.get(&tenant("acme"), "ada@shared.io").await.unwrap().unwrap();
        let globex = service
            .get(&tenant("globex"), "ada@shared.io")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(acme.user_id, "acme-1");
        assert_eq!(globex.user_id, "globex-1");
        assert_eq!(backend.identity_calls(), 2);
    }

    #[tokio::test]
    async fn test_email_match_is_case_sensitive() {
        let backend = MemoryBackend::new_shared();
        backend.add_identity("acme", record("u-1", "Ada@acme.io", "Ada", "Lovelace"));
        let service = service(backend);

        assert_eq!(service.get(&tenant("acme"), "ada@acme.io").await.unwrap(), None);
        assert!(service.get(&tenant("acme"), "Ada@acme.io").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_emails_are_data_inconsistency() {
        let backend = MemoryBackend::new_shared();
        backend.add_identity("acme", record("u-1", "ada@acme.io", "Ada", "One"));
        backend.add_identity("acme", record("u-2", "ada@acme.io", "Ada", "Two"));
        let service = service(backend);

        let err = service.get(&tenant("acme"), "ada@acme.io").await.unwrap_err();
        match err {
            DomainError::Upstream { message, .. } => assert!(message.contains("inconsistency")),
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    // ============================================================
    // Batch lookups
    // ============================================================

    /// Test: one failing lookup is dropped, the rest are returned
    #[tokio::test]
    async fn test_get_many_tolerates_partial_failure() {
        let backend = MemoryBackend::new_shared();
        backend.add_identity("acme", record("u-1", "a@acme.io", "A", "One"));
        backend.add_identity("acme", record("u-2", "b@acme.io", "B", "Two"));
        backend.add_identity("acme", record("u-3", "c@acme.io", "C", "Three"));
        backend.fail_identity_for("b@acme.io");
        let service = service(backend);

        let found = service
            .get_many(&tenant("acme"), &emails(&["a@acme.io", "b@acme.io", "c@acme.io"]))
            .await;

        assert_eq!(found.len(), 2);
        assert_eq!(found["a@acme.io"].user_id, "u-1");
        assert_eq!(found["c@acme.io"].user_id, "u-3");
        assert!(!found.contains_key("b@acme.io"));
    }

    #[tokio::test]
    async fn test_get_many_uses_cache_and_writes_back() {
        let backend = MemoryBackend::new_shared();
        backend.add_identity("acme", record("u-1", "a@acme.io", "A", "One"));
        backend.add_identity("acme", record("u-2", "b@acme.io", "B", "Two"));
        let service = service(backend.clone());

        service.get(&tenant("acme"), "a@acme.io").await.unwrap();
        let found = service
            .get_many(&tenant("acme"), &emails(&["a@acme.io", "b@acme.io", "b@acme.io"]))
            .await;
        assert_eq!(found.len(), 2);
        // a from cache, b fetched once despite the duplicate
        assert_eq!(backend.identity_calls(), 2);

        service
            .get_many(&tenant("acme"), &emails(&["a@acme.io", "b@acme.io"]))
            .await;
        assert_eq!(backend.identity_calls(), 2);
    }

    /// Test: a spawned batch caches what it found and only retries the failure
    #[tokio::test]
    async fn test_spawned_get_many_writes_back_successful_lookups() {
        let backend = MemoryBackend::new_shared();
        backend.add_identity("acme", record("u-1", "a@acme.io", "A", "One"));
        backend.add_identity("acme", record("u-2", "b@acme.io", "B", "Two"));
        backend.fail_identity_for("b@acme.io");
        let service: Arc<dyn IdentityLookup> = Arc::new(service(backend.clone()));

        let batch = emails(&["a@acme.io", "b@acme.io"]);
        let spawned = {
            let service = service.clone();
            let batch = batch.clone();
            tokio::spawn(async move { service.get_many(&tenant("acme"), &batch).await })
        };
        let found = spawned.await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(backend.identity_calls(), 2);

        service.get_many(&tenant("acme"), &batch).await;
        assert_eq!(backend.identity_calls(), 3);
    }

    #[tokio::test]
    async fn test_get_many_bounds_concurrency() {
        let backend = MemoryBackend::new_shared();
        let all: Vec<String> = (0..12).map(|i| format!("user{i}@acme.io")).collect();
        for (i, email) in all.iter().enumerate() {
            backend.add_identity("acme", record(&format!("u-{i}"), email, "U", "Ser"));
        }
        backend.set_identity_delay(Duration::from_millis(20));
        let service = IdentityEnrichmentService::new(
            backend.clone(),
            TtlCacheConfig::default(),
            IdentityEnrichmentConfig::default().with_max_concurrent_lookups(3),
        );

        let found = service.get_many(&tenant("acme"), &all).await;

        assert_eq!(found.len(), 12);
        assert!(backend.max_identity_in_flight() <= 3);
        assert!(backend.max_identity_in_flight() >= 1);
    }

    #[tokio::test]
    async fn test_slow_lookup_times_out_without_failing_batch() {
        let backend = MemoryBackend::new_shared();
        backend.add_identity("acme", record("u-1", "a@acme.io", "A", "One"));
        backend.set_identity_delay(Duration::from_millis(200));
        let service = IdentityEnrichmentService::new(
            backend,
            TtlCacheConfig::default(),
            IdentityEnrichmentConfig::default().with_lookup_timeout(Duration::from_millis(20)),
        );

        let found = service.get_many(&tenant("acme"), &emails(&["a@acme.io"])).await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_enrich_user_roles_keeps_email() {
        let backend = MemoryBackend::new_shared();
        backend.add_identity("acme", record("u-1", "ada@acme.io", "Ada", "Lovelace"));
        let service = service(backend);

        let mut users = vec![
            UserRoles {
                user: UserIdentity::from_email("ada@acme.io"),
                roles: vec![Role::new("owner")],
            },
            UserRoles {
                user: UserIdentity::from_email("ghost@acme.io"),
                roles: vec![Role::new("member")],
            },
        ];
        service.enrich_user_roles(&tenant("acme"), &mut users).await;

        assert_eq!(users[0].user.user_id, "u-1");
        assert_eq!(users[0].user.email, "ada@acme.io");
        assert_eq!(users[0].user.last_name.as_deref(), Some("Lovelace"));
        // unresolved users keep their email-based identity
        assert_eq!(users[1].user, UserIdentity::from_email("ghost@acme.io"));
    }
}
