//! Field-level authorization.
//!
//! A field annotated with the `Authorized` directive only resolves when the
//! caller holds a relation on an entity named by the field's arguments:
//!
//! ```text
//! @Authorized(relation, entityTypeParamName?, entityTypeParamHint?, entityIdParamName)
//!
//!   Check(user:<caller email>, relation, <entityType>:<entityId>)
//! ```
//!
//! The gate fails closed: a denied check and any error while checking both
//! yield [`DomainError::Unauthorized`]. The underlying error is only logged.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use fgaiam_backends::{AuthorizationEngine, TupleKey};
use fgaiam_domain::{DomainError, DomainResult};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::context::RequestContext;
use crate::roles::USER_TYPE;
use crate::store::StoreResolver;
use crate::tenant::{tenant_of, TenantResolver};

/// Parameters of the `Authorized` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedDirective {
    /// Relation to check.
    pub relation: String,
    /// Relation to check instead, per entity type.
    pub relation_overrides: HashMap<String, String>,
    /// Dotted argument path holding the entity type.
    pub entity_type_param_name: Option<String>,
    /// Entity type used when no type parameter is named.
    pub entity_type_param_hint: Option<String>,
    /// Dotted argument path holding the entity id.
    pub entity_id_param_name: String,
}

impl AuthorizedDirective {
    pub fn new(relation: impl Into<String>, entity_id_param_name: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            relation_overrides: HashMap::new(),
            entity_type_param_name: None,
            entity_type_param_hint: None,
            entity_id_param_name: entity_id_param_name.into(),
        }
    }

    pub fn with_entity_type_param(mut self, name: impl Into<String>) -> Self {
        self.entity_type_param_name = Some(name.into());
        self
    }

    pub fn with_entity_type_hint(mut self, hint: impl Into<String>) -> Self {
        self.entity_type_param_hint = Some(hint.into());
        self
    }

    pub fn with_relation_override(
        mut self,
        entity_type: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        self.relation_overrides
            .insert(entity_type.into(), relation.into());
        self
    }

    /// Relation to check for `entity_type`.
    pub fn relation_for(&self, entity_type: &str) -> &str {
        self.relation_overrides
            .get(entity_type)
            .map(String::as_str)
            .unwrap_or(&self.relation)
    }

    /// Reads the entity type and id from the field arguments.
    pub fn entity(&self, args: &Value) -> DomainResult<(String, String)> {
        let entity_type = match (&self.entity_type_param_name, &self.entity_type_param_hint) {
            (Some(path), _) => string_arg(args, path)?,
            (None, Some(hint)) => hint.clone(),
            (None, None) => {
                return Err(DomainError::invalid_input(
                    "directive names neither an entity type parameter nor a hint",
                ))
            }
        };
        let entity_id = string_arg(args, &self.entity_id_param_name)?;
        Ok((entity_type, entity_id))
    }
}

/// Follows a dotted path (`input.resource.id`) through nested objects.
fn lookup<'a>(args: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(args, |value, segment| value.get(segment))
}

fn string_arg(args: &Value, path: &str) -> DomainResult<String> {
    match lookup(args, path) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(DomainError::invalid_input(format!(
            "argument '{path}' must not be empty"
        ))),
        Some(_) => Err(DomainError::invalid_input(format!(
            "argument '{path}' must be a string"
        ))),
        None => Err(DomainError::invalid_input(format!(
            "argument '{path}' is missing"
        ))),
    }
}

/// Enforces the `Authorized` directive.
pub struct FieldAuthorizationGate {
    engine: Arc<dyn AuthorizationEngine>,
    stores: Arc<dyn StoreResolver>,
    tenants: Arc<dyn TenantResolver>,
}

impl FieldAuthorizationGate {
    pub fn new(
        engine: Arc<dyn AuthorizationEngine>,
        stores: Arc<dyn StoreResolver>,
        tenants: Arc<dyn TenantResolver>,
    ) -> Self {
        Self {
            engine,
            stores,
            tenants,
        }
    }

    /// Succeeds only when the caller holds the directive's relation on the
    /// entity named by `args`.
    #[instrument(skip(self, ctx, directive, args), fields(relation = %directive.relation))]
    pub async fn authorize(
        &self,
        ctx: &RequestContext,
        directive: &AuthorizedDirective,
        args: &Value,
    ) -> DomainResult<()> {
        let (entity_type, entity_id) = directive.entity(args)?;
        let email = ctx.caller_email()?;

        let tuple = TupleKey::new(
            format!("{USER_TYPE}:{email}"),
            directive.relation_for(&entity_type),
            format!("{entity_type}:{entity_id}"),
        );

        match self.check(ctx, &tuple).await {
            Ok(true) => {
                debug!(object = %tuple.object, "field access granted");
                Ok(())
            }
            Ok(false) => {
                debug!(user = %tuple.user, object = %tuple.object, "field access denied");
                Err(DomainError::unauthorized(format!(
                    "{} is not {} of {}",
                    tuple.user, tuple.relation, tuple.object
                )))
            }
            Err(e) => {
                warn!(error = %e, object = %tuple.object, "authorization check failed, denying");
                Err(DomainError::unauthorized("authorization could not be verified"))
            }
        }
    }

    /// Runs `resolver` only after [`authorize`](Self::authorize) succeeds.
    pub async fn guard<F, T>(
        &self,
        ctx: &RequestContext,
        directive: &AuthorizedDirective,
        args: &Value,
        resolver: F,
    ) -> DomainResult<T>
    where
        F: Future<Output = DomainResult<T>>,
    {
        self.authorize(ctx, directive, args).await?;
        resolver.await
    }

    async fn check(&self, ctx: &RequestContext, tuple: &TupleKey) -> DomainResult<bool> {
        let tenant = tenant_of(self.tenants.as_ref(), ctx).await?;
        let store_id = self.stores.store_id(&tenant.organization_name).await?;
        let model_id = self.stores.model_id(&tenant.organization_name).await.ok();

        self.engine
            .check(&store_id, tuple, model_id.as_deref())
            .await
            .map_err(|e| crate::errors::upstream_error(&e))
    }
}
