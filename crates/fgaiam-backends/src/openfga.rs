//! OpenFGA gRPC client.
//!
//! Calls the `OpenFGAService` of the engine through `openfga-client`. The
//! service client is bound to a lazily connected channel, so building an
//! [`OpenFgaClient`] never touches the network but must happen inside a
//! Tokio runtime.
//!
//! Failed calls arrive as `tonic::Status`. Unreachable engines become
//! [`BackendError::Transport`]; everything else becomes
//! [`BackendError::Engine`] with the HTTP status the OpenFGA gateway would
//! answer, so callers classify rejected writes the same way for every
//! transport.

use std::time::Duration;

use async_trait::async_trait;
use openfga_client::client::{
    user, BasicOpenFgaServiceClient, CheckRequest, CheckRequestTupleKey, ListStoresRequest,
    ListUsersRequest as GrpcListUsersRequest, Object, ReadAuthorizationModelsRequest,
    ReadRequest, ReadRequestTupleKey, TupleKey as GrpcTupleKey, TupleKeyWithoutCondition, User,
    UserTypeFilter, WriteRequest, WriteRequestDeletes, WriteRequestWrites,
};
use openfga_client::tonic::{self, Code, Status};
use tracing::{debug, instrument};

use crate::error::{BackendError, BackendResult, OPENFGA, WRITE_FAILED_CODE};
use crate::traits::{
    AuthorizationEngine, AuthorizationModelRef, ListUsersRequest, StorePage, StoreRef, TupleKey,
    UserRef,
};

/// Page size requested when reading tuples.
const READ_PAGE_SIZE: i32 = 100;

/// Message prefixes of writes rejected for existing or missing tuples.
const DUPLICATE_TUPLE: &str = "cannot write a tuple which already exists";
const MISSING_TUPLE: &str = "cannot delete a tuple which does not exist";

/// Connection settings for [`OpenFgaClient`].
#[derive(Debug, Clone)]
pub struct OpenFgaClientConfig {
    /// gRPC endpoint of OpenFGA, e.g. `http://openfga:8081`.
    pub endpoint: String,
    /// Optional pre-shared key sent as a bearer token.
    pub api_token: Option<String>,
    /// Deadline of every call.
    pub timeout: Duration,
}

impl OpenFgaClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_token: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`AuthorizationEngine`] backed by the OpenFGA gRPC API.
#[derive(Clone)]
pub struct OpenFgaClient {
    service: BasicOpenFgaServiceClient,
    timeout: Duration,
}

impl OpenFgaClient {
    /// Builds a client; fails if the endpoint is not a usable URL.
    pub fn new(config: OpenFgaClientConfig) -> BackendResult<Self> {
        let endpoint = url::Url::parse(&config.endpoint).map_err(config_error)?;
        let service = match &config.api_token {
            Some(token) => BasicOpenFgaServiceClient::new_with_basic_auth(endpoint, token),
            None => BasicOpenFgaServiceClient::new_unauthenticated(endpoint),
        }
        .map_err(config_error)?;

        Ok(Self {
            service,
            timeout: config.timeout,
        })
    }

    fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request.set_timeout(self.timeout);
        request
    }
}

fn config_error(err: impl std::fmt::Display) -> BackendError {
    BackendError::Config {
        service: OPENFGA,
        message: err.to_string(),
    }
}

/// Maps a failed call onto the backend error taxonomy.
fn status_error(status: Status) -> BackendError {
    let message = status.message().to_string();
    if message.contains(DUPLICATE_TUPLE) || message.contains(MISSING_TUPLE) {
        return BackendError::Engine {
            status: 400,
            code: WRITE_FAILED_CODE.to_string(),
            message,
        };
    }

    let (http_status, code) = match status.code() {
        Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled => {
            return BackendError::transport(OPENFGA, status);
        }
        Code::InvalidArgument => (400, "validation_error"),
        Code::FailedPrecondition | Code::OutOfRange => (400, "failed_precondition"),
        Code::Unauthenticated => (401, "unauthenticated"),
        Code::PermissionDenied => (403, "forbidden"),
        Code::NotFound => (404, "not_found"),
        Code::AlreadyExists | Code::Aborted => (409, "conflict"),
        Code::ResourceExhausted => (429, "rate_limit_exceeded"),
        Code::Unimplemented => (501, "not_implemented"),
        _ => (500, "internal_error"),
    };
    BackendError::Engine {
        status: http_status,
        code: code.to_string(),
        message,
    }
}

fn continuation(token: String) -> Option<String> {
    (!token.is_empty()).then_some(token)
}

fn user_ref(result: User) -> BackendResult<UserRef> {
    match result.user {
        Some(user::User::Object(object)) => Ok(UserRef::Object {
            user_type: object.r#type,
            id: object.id,
        }),
        Some(user::User::Userset(userset)) => Ok(UserRef::Userset {
            user_type: userset.r#type,
            id: userset.id,
            relation: userset.relation,
        }),
        Some(user::User::Wildcard(wildcard)) => Ok(UserRef::Wildcard {
            user_type: wildcard.r#type,
        }),
        None => Err(BackendError::decode(OPENFGA, "list-users result without a user")),
    }
}

impl From<TupleKey> for GrpcTupleKey {
    fn from(key: TupleKey) -> Self {
        Self {
            user: key.user,
            relation: key.relation,
            object: key.object,
            condition: None,
        }
    }
}

impl From<TupleKey> for TupleKeyWithoutCondition {
    fn from(key: TupleKey) -> Self {
        Self {
            user: key.user,
            relation: key.relation,
            object: key.object,
        }
    }
}

/// Read filter; an all-empty filter reads the whole store.
fn read_filter(filter: &TupleKey) -> Option<ReadRequestTupleKey> {
    if filter.user.is_empty() && filter.relation.is_empty() && filter.object.is_empty() {
        return None;
    }
    Some(ReadRequestTupleKey {
        user: filter.user.clone(),
        relation: filter.relation.clone(),
        object: filter.object.clone(),
    })
}

#[async_trait]
impl AuthorizationEngine for OpenFgaClient {
    #[instrument(skip(self))]
    async fn list_stores(&self, continuation_token: Option<&str>) -> BackendResult<StorePage> {
        let request = self.request(ListStoresRequest {
            continuation_token: continuation_token.unwrap_or_default().to_string(),
            ..Default::default()
        });

        let page = self
            .service
            .clone()
            .list_stores(request)
            .await
            .map_err(status_error)?
            .into_inner();
        Ok(StorePage {
            stores: page
                .stores
                .into_iter()
                .map(|s| StoreRef {
                    id: s.id,
                    name: s.name,
                })
                .collect(),
            continuation_token: continuation(page.continuation_token),
        })
    }

    #[instrument(skip(self))]
    async fn read_authorization_models(
        &self,
        store_id: &str,
    ) -> BackendResult<Vec<AuthorizationModelRef>> {
        let request = self.request(ReadAuthorizationModelsRequest {
            store_id: store_id.to_string(),
            ..Default::default()
        });

        let response = self
            .service
            .clone()
            .read_authorization_models(request)
            .await
            .map_err(status_error)?
            .into_inner();
        Ok(response
            .authorization_models
            .into_iter()
            .map(|m| AuthorizationModelRef {
                id: m.id,
                schema_version: m.schema_version,
            })
            .collect())
    }

    #[instrument(skip(self, request), fields(object = %request.object.to_object_string(), relation = %request.relation))]
    async fn list_users(
        &self,
        store_id: &str,
        request: &ListUsersRequest,
    ) -> BackendResult<Vec<UserRef>> {
        let grpc_request = self.request(GrpcListUsersRequest {
            store_id: store_id.to_string(),
            authorization_model_id: request.authorization_model_id.clone().unwrap_or_default(),
            object: Some(Object {
                r#type: request.object.object_type.clone(),
                id: request.object.id.clone(),
            }),
            relation: request.relation.clone(),
            user_filters: request
                .user_types
                .iter()
                .map(|t| UserTypeFilter {
                    r#type: t.clone(),
                    relation: String::new(),
                })
                .collect(),
            ..Default::default()
        });

        let response = self
            .service
            .clone()
            .list_users(grpc_request)
            .await
            .map_err(status_error)?
            .into_inner();
        let users = response
            .users
            .into_iter()
            .map(user_ref)
            .collect::<BackendResult<Vec<_>>>()?;
        debug!(count = users.len(), "listed users");
        Ok(users)
    }

    #[instrument(skip(self, writes, deletes), fields(writes = writes.len(), deletes = deletes.len()))]
    async fn write(
        &self,
        store_id: &str,
        writes: Vec<TupleKey>,
        deletes: Vec<TupleKey>,
        authorization_model_id: Option<&str>,
    ) -> BackendResult<()> {
        let request = self.request(WriteRequest {
            store_id: store_id.to_string(),
            writes: (!writes.is_empty()).then(|| WriteRequestWrites {
                tuple_keys: writes.into_iter().map(GrpcTupleKey::from).collect(),
                ..Default::default()
            }),
            deletes: (!deletes.is_empty()).then(|| WriteRequestDeletes {
                tuple_keys: deletes
                    .into_iter()
                    .map(TupleKeyWithoutCondition::from)
                    .collect(),
                ..Default::default()
            }),
            authorization_model_id: authorization_model_id.unwrap_or_default().to_string(),
        });

        self.service
            .clone()
            .write(request)
            .await
            .map_err(status_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn read(&self, store_id: &str, filter: &TupleKey) -> BackendResult<Vec<TupleKey>> {
        let mut service = self.service.clone();
        let mut tuples = Vec::new();
        let mut continuation_token = String::new();

        loop {
            let request = self.request(ReadRequest {
                store_id: store_id.to_string(),
                tuple_key: read_filter(filter),
                page_size: Some(READ_PAGE_SIZE),
                continuation_token: std::mem::take(&mut continuation_token),
                ..Default::default()
            });

            let page = service
                .read(request)
                .await
                .map_err(status_error)?
                .into_inner();
            for tuple in page.tuples {
                let key = tuple
                    .key
                    .ok_or_else(|| BackendError::decode(OPENFGA, "tuple without a key"))?;
                tuples.push(TupleKey {
                    user: key.user,
                    relation: key.relation,
                    object: key.object,
                });
            }

            match continuation(page.continuation_token) {
                Some(token) => continuation_token = token,
                None => break,
            }
        }

        Ok(tuples)
    }

    #[instrument(skip(self))]
    async fn check(
        &self,
        store_id: &str,
        tuple: &TupleKey,
        authorization_model_id: Option<&str>,
    ) -> BackendResult<bool> {
        let request = self.request(CheckRequest {
            store_id: store_id.to_string(),
            tuple_key: Some(CheckRequestTupleKey {
                user: tuple.user.clone(),
                relation: tuple.relation.clone(),
                object: tuple.object.clone(),
            }),
            authorization_model_id: authorization_model_id.unwrap_or_default().to_string(),
            ..Default::default()
        });

        let response = self
            .service
            .clone()
            .check(request)
            .await
            .map_err(status_error)?
            .into_inner();
        Ok(response.allowed)
    }
}
