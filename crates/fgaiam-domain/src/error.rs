//! Domain error types for tenant resolution and role operations.

use thiserror::Error;

/// Domain-specific errors surfaced by the pipeline.
///
/// Variants follow how a failure must be handled, not where it happened:
/// resolution-class errors abort a request, while per-item enrichment
/// failures never reach this type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    /// Missing or unusable bearer token.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// Tenant explicitly refused (excluded realm, non-organization account).
    #[error("tenant rejected: {reason}")]
    TenantRejected { reason: String },

    /// A named entity does not exist (store, model, account, workspace, user).
    #[error("{kind} not found: {name}")]
    NotFound { kind: String, name: String },

    /// A dependency failed or returned something unusable.
    #[error("upstream {dependency} error: {message}")]
    Upstream {
        dependency: String,
        message: String,
    },

    /// Malformed caller input (argument paths, argument types, unknown roles).
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Authorization denied or indeterminate.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },
}

impl DomainError {
    /// Creates a `NotFound` error.
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Creates an `Upstream` error for the named dependency.
    pub fn upstream(dependency: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            dependency: dependency.into(),
            message: message.into(),
        }
    }

    /// Creates an `InvalidInput` error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Creates an `Unauthorized` error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Returns true for failures that stem from tenant or store resolution.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            DomainError::TenantRejected { .. } | DomainError::NotFound { .. }
        )
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
