//! Per-request context.
//!
//! A [`RequestContext`] is created by the transport once the bearer token is
//! verified and is passed by reference through every service call. The
//! tenant is filled in by [`crate::tenant::TenantContextResolver::resolve_into`].

use fgaiam_domain::{DomainError, DomainResult, TenantContext};
use serde::{Deserialize, Serialize};

/// Claims of an already verified bearer token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(rename = "iss", default)]
    pub issuer: String,
    #[serde(rename = "sub", default)]
    pub subject: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
}

impl TokenClaims {
    pub fn new(issuer: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            subject: subject.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, given_name: impl Into<String>, family_name: impl Into<String>) -> Self {
        self.given_name = Some(given_name.into());
        self.family_name = Some(family_name.into());
        self
    }
}

/// Context of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    claims: TokenClaims,
    tenant: Option<TenantContext>,
}

impl RequestContext {
    pub fn new(claims: TokenClaims) -> Self {
        Self {
            claims,
            tenant: None,
        }
    }

    /// Creates a context whose tenant is already known.
    pub fn with_tenant(mut self, tenant: TenantContext) -> Self {
        self.tenant = Some(tenant);
        self
    }

    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    pub fn set_tenant(&mut self, tenant: TenantContext) {
        self.tenant = Some(tenant);
    }

    /// The resolved tenant, if resolution already happened.
    pub fn resolved_tenant(&self) -> Option<&TenantContext> {
        self.tenant.as_ref()
    }

    /// The resolved tenant; fails when resolution has not happened.
    pub fn tenant(&self) -> DomainResult<&TenantContext> {
        self.tenant
            .as_ref()
            .ok_or_else(|| DomainError::Authentication {
                message: "tenant has not been resolved for this request".to_string(),
            })
    }

    /// The caller's email claim.
    pub fn caller_email(&self) -> DomainResult<&str> {
        self.claims
            .email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| DomainError::Authentication {
                message: "token carries no email claim".to_string(),
            })
    }
}
