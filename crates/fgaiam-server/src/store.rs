//! Authorization store and model lookup.
//!
//! Every organization owns one store in the authorization engine, named
//! after the organization. Ids are looked up by name and cached per
//! organization under `store-<org>` and `model-<org>`.
//!
//! Concurrent misses for the same organization may both hit the engine;
//! both write the same value.

use std::sync::Arc;

use async_trait::async_trait;
use fgaiam_backends::{AuthorizationEngine, BackendError, WRITE_FAILED_CODE};
use fgaiam_domain::{DomainError, DomainResult, TtlCache, TtlCacheConfig};
use tracing::{debug, instrument};

use crate::errors::upstream_error;

/// Resolves store and model ids of an organization.
#[async_trait]
pub trait StoreResolver: Send + Sync {
    /// Id of the store named `organization`.
    async fn store_id(&self, organization: &str) -> DomainResult<String>;

    /// Id of the current authorization model of the organization's store.
    async fn model_id(&self, organization: &str) -> DomainResult<String>;
}

/// True when the engine rejected a write because the tuple already exists.
pub fn is_duplicate_write_error(err: &BackendError) -> bool {
    matches!(err, BackendError::Engine { code, message, .. }
        if code == WRITE_FAILED_CODE && message.contains("already exists"))
}

/// True when the engine rejected a delete because the tuple does not exist.
pub fn is_missing_tuple_error(err: &BackendError) -> bool {
    matches!(err, BackendError::Engine { code, message, .. }
        if code == WRITE_FAILED_CODE && message.contains("does not exist"))
}

/// [`StoreResolver`] backed by the engine and a TTL cache.
pub struct AuthorizationStoreCache {
    engine: Arc<dyn AuthorizationEngine>,
    cache: TtlCache<String, String>,
}

impl AuthorizationStoreCache {
    pub fn new(engine: Arc<dyn AuthorizationEngine>, config: TtlCacheConfig) -> Self {
        Self {
            engine,
            cache: TtlCache::new("store", config),
        }
    }

    /// Lists every store page and returns the id of the store named `organization`.
    async fn find_store(&self, organization: &str) -> DomainResult<Option<String>> {
        let mut continuation_token: Option<String> = None;
        loop {
            let page = self
                .engine
                .list_stores(continuation_token.as_deref())
                .await
                .map_err(|e| upstream_error(&e))?;

            if let Some(store) = page.stores.into_iter().find(|s| s.name == organization) {
                return Ok(Some(store.id));
            }

            match page.continuation_token {
                Some(token) => continuation_token = Some(token),
                None => return Ok(None),
            }
        }
    }
}

fn store_key(organization: &str) -> String {
    format!("store-{organization}")
}

fn model_key(organization: &str) -> String {
    format!("model-{organization}")
}

#[async_trait]
impl StoreResolver for AuthorizationStoreCache {
    #[instrument(skip(self))]
    async fn store_id(&self, organization: &str) -> DomainResult<String> {
        let key = store_key(organization);
        if let Some(id) = self.cache.get(&key).await {
            return Ok(id);
        }

        let id = self
            .find_store(organization)
            .await?
            .ok_or_else(|| DomainError::not_found("store", organization))?;

        debug!(store_id = %id, "resolved store");
        self.cache.insert(key, id.clone()).await;
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn model_id(&self, organization: &str) -> DomainResult<String> {
        let key = model_key(organization);
        if let Some(id) = self.cache.get(&key).await {
            return Ok(id);
        }

        let store_id = self.store_id(organization).await?;
        let models = self
            .engine
            .read_authorization_models(&store_id)
            .await
            .map_err(|e| upstream_error(&e))?;

        // The engine lists models newest first.
        let id = models
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| DomainError::not_found("authorization model", organization))?;

        debug!(model_id = %id, "resolved authorization model");
        self.cache.insert(key, id.clone()).await;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fgaiam_backends::{MemoryBackend, TupleKey};
    use std::time::Duration;

    fn cache_over(backend: Arc<MemoryBackend>, ttl: Duration) -> AuthorizationStoreCache {
        AuthorizationStoreCache::new(backend, TtlCacheConfig::new(10, ttl))
    }

    /// Test: one list call per organization within the TTL window
    #[tokio::test]
    async fn test_store_id_is_cached() {
        let backend = MemoryBackend::new_shared();
        backend.add_store("01S1", "acme");
        let stores = cache_over(backend.clone(), Duration::from_secs(300));

        assert_eq!(stores.store_id("acme").await.unwrap(), "01S1");
        assert_eq!(stores.store_id("acme").await.unwrap(), "01S1");
        assert_eq!(backend.list_stores_calls(), 1);
    }

    #[tokio::test]
    async fn test_store_id_is_refetched_after_ttl() {
        let backend = MemoryBackend::new_shared();
        backend.add_store("01S1", "acme");
        let stores = cache_over(backend.clone(), Duration::from_millis(50));

        stores.store_id("acme").await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        stores.store_id("acme").await.unwrap();

        assert_eq!(backend.list_stores_calls(), 2);
    }

    #[tokio::test]
    async fn test_store_lookup_follows_continuation_tokens() {
        let backend = MemoryBackend::new_shared();
        for i in 0..5 {
            backend.add_store(format!("01S{i}"), format!("org-{i}"));
        }
        backend.set_store_page_size(2);
        let stores = cache_over(backend.clone(), Duration::from_secs(300));

        assert_eq!(stores.store_id("org-4").await.unwrap(), "01S4");
        assert_eq!(backend.list_stores_calls(), 3);
    }

    #[tokio::test]
    async fn test_unknown_store_is_not_found_and_not_cached() {
        let backend = MemoryBackend::new_shared();
        backend.add_store("01S1", "acme");
        let stores = cache_over(backend.clone(), Duration::from_secs(300));

        let err = stores.store_id("globex").await.unwrap_err();
        assert_eq!(err, DomainError::not_found("store", "globex"));

        stores.store_id("globex").await.unwrap_err();
        assert_eq!(backend.list_stores_calls(), 2);
    }

    #[tokio::test]
    async fn test_model_id_takes_first_listed_model() {
        let backend = MemoryBackend::new_shared();
        backend.add_store("01S1", "acme");
        backend.add_model("01S1", "01M-old");
        backend.add_model("01S1", "01M-new");
        let stores = cache_over(backend.clone(), Duration::from_secs(300));

        assert_eq!(stores.model_id("acme").await.unwrap(), "01M-new");
        assert_eq!(stores.model_id("acme").await.unwrap(), "01M-new");
        assert_eq!(backend.read_models_calls(), 1);
        // store id was resolved once and reused
        assert_eq!(backend.list_stores_calls(), 1);
    }

    #[tokio::test]
    async fn test_store_without_models_is_not_found() {
        let backend = MemoryBackend::new_shared();
        backend.add_store("01S1", "acme");
        let stores = cache_over(backend, Duration::from_secs(300));

        let err = stores.model_id("acme").await.unwrap_err();
        assert_eq!(err, DomainError::not_found("authorization model", "acme"));
    }

    #[test]
    fn test_engine_error_classification() {
        let duplicate = BackendError::Engine {
            status: 400,
            code: WRITE_FAILED_CODE.to_string(),
            message: "cannot write a tuple which already exists".to_string(),
        };
        let missing = BackendError::Engine {
            status: 400,
            code: WRITE_FAILED_CODE.to_string(),
            message: "cannot delete a tuple which does not exist".to_string(),
        };
        let other = BackendError::Status {
            service: "openfga",
            status: 500,
            body: "already exists".to_string(),
        };

        assert!(is_duplicate_write_error(&duplicate));
        assert!(!is_duplicate_write_error(&missing));
        assert!(is_missing_tuple_error(&missing));
        assert!(!is_duplicate_write_error(&other));
        assert!(!is_missing_tuple_error(&other));
    }

    /// Test: rejected writes from the memory engine classify like real ones
    #[tokio::test]
    async fn test_memory_engine_errors_use_shared_write_code() {
        let backend = MemoryBackend::new_shared();
        backend.add_store("01S1", "acme");
        let tuple = TupleKey::new("user:ada@acme.io", "assignee", "role:account/1mxz9/a/owner");
        backend.add_tuple("01S1", tuple.clone());

        let duplicate = backend
            .write("01S1", vec![tuple.clone()], Vec::new(), None)
            .await
            .unwrap_err();
        let missing = backend
            .write(
                "01S1",
                Vec::new(),
                vec![TupleKey::new("user:bob@acme.io", "assignee", "role:account/1mxz9/a/owner")],
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(&duplicate, BackendError::Engine { code, .. } if code == WRITE_FAILED_CODE));
        assert!(is_duplicate_write_error(&duplicate));
        assert!(is_missing_tuple_error(&missing));
    }
}
