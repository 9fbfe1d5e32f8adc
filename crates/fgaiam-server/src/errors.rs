//! Client-facing error classification.
//!
//! Maps [`DomainError`]s to a protocol-agnostic [`ClientError`] that the
//! transport turns into its own error shape (GraphQL error extensions, HTTP
//! status).
//!
//! # Error Detail Configuration
//!
//! [`ErrorConfig`] controls how much detail reaches clients. In production,
//! realm names, store names, and upstream messages are replaced by stable
//! generic messages; the full error is logged server-side.
//!
//! ```rust
//! use fgaiam_domain::DomainError;
//! use fgaiam_server::errors::{classify_error, ErrorConfig, ErrorKind};
//!
//! let err = DomainError::not_found("store", "acme");
//!
//! let client = classify_error(&err, &ErrorConfig::production());
//! assert_eq!(client.kind, ErrorKind::NotFound);
//! assert!(!client.message.contains("acme"));
//!
//! let client = classify_error(&err, &ErrorConfig::development());
//! assert!(client.message.contains("acme"));
//! ```

use fgaiam_backends::BackendError;
use fgaiam_domain::DomainError;
use tracing::{debug, error};

use crate::config::ErrorSettings;

/// Configuration for error message detail level.
#[derive(Debug, Clone, Default)]
pub struct ErrorConfig {
    /// Whether to include detailed error messages in responses.
    ///
    /// When `false` (production mode) messages are generic and upstream
    /// error text is never exposed.
    pub detailed_errors: bool,
}

impl ErrorConfig {
    /// Create a production configuration that hides error details.
    pub fn production() -> Self {
        Self {
            detailed_errors: false,
        }
    }

    /// Create a development configuration that shows full error details.
    pub fn development() -> Self {
        Self {
            detailed_errors: true,
        }
    }
}

impl From<&ErrorSettings> for ErrorConfig {
    fn from(settings: &ErrorSettings) -> Self {
        Self {
            detailed_errors: settings.detailed,
        }
    }
}

/// Protocol-agnostic error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or unusable credentials (401)
    Unauthenticated,
    /// Caller or tenant not permitted (403)
    Forbidden,
    /// Entity does not exist (404)
    NotFound,
    /// Malformed input (400)
    InvalidInput,
    /// A dependency failed (503)
    Unavailable,
    /// Unexpected server error (500)
    Internal,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidInput => 400,
            ErrorKind::Unavailable => 503,
            ErrorKind::Internal => 500,
        }
    }
}

/// Error as presented to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    pub kind: ErrorKind,
    /// Stable machine-readable code, e.g. `UNAUTHORIZED`.
    pub code: &'static str,
    pub message: String,
}

impl ClientError {
    fn new(kind: ErrorKind, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }
}

/// Converts a backend failure into a domain error naming the dependency.
pub fn upstream_error(err: &BackendError) -> DomainError {
    DomainError::upstream(err.service(), err.to_string())
}

/// Classifies a domain error with the configured detail level.
///
/// Upstream failures are logged at error level with full context; other
/// errors are logged at debug level.
pub fn classify_error(err: &DomainError, config: &ErrorConfig) -> ClientError {
    match err {
        DomainError::Upstream { dependency, message } => {
            error!(dependency = %dependency, error = %message, "upstream dependency failed");
        }
        other => debug!(error = %other, "request failed"),
    }

    if config.detailed_errors {
        classify_detailed(err)
    } else {
        classify_generic(err)
    }
}

/// Classify error with full details (development mode).
fn classify_detailed(err: &DomainError) -> ClientError {
    let message = err.to_string();
    match err {
        DomainError::Authentication { .. } => {
            ClientError::new(ErrorKind::Unauthenticated, "UNAUTHENTICATED", message)
        }
        DomainError::TenantRejected { .. } => {
            ClientError::new(ErrorKind::Forbidden, "TENANT_REJECTED", message)
        }
        DomainError::NotFound { .. } => ClientError::new(ErrorKind::NotFound, "NOT_FOUND", message),
        DomainError::Upstream { .. } => {
            ClientError::new(ErrorKind::Unavailable, "UNAVAILABLE", message)
        }
        DomainError::InvalidInput { .. } => {
            ClientError::new(ErrorKind::InvalidInput, "INVALID_INPUT", message)
        }
        DomainError::Unauthorized { .. } => {
            ClientError::new(ErrorKind::Forbidden, "UNAUTHORIZED", message)
        }
    }
}

/// Classify error with generic messages (production mode).
fn classify_generic(err: &DomainError) -> ClientError {
    match err {
        DomainError::Authentication { .. } => ClientError::new(
            ErrorKind::Unauthenticated,
            "UNAUTHENTICATED",
            "authentication required",
        ),
        DomainError::TenantRejected { .. } => ClientError::new(
            ErrorKind::Forbidden,
            "TENANT_REJECTED",
            "tenant is not permitted",
        ),
        // The kind ("store", "account") is part of the API contract; the name is not.
        DomainError::NotFound { kind, .. } => {
            ClientError::new(ErrorKind::NotFound, "NOT_FOUND", format!("{kind} not found"))
        }
        DomainError::Upstream { .. } => ClientError::new(
            ErrorKind::Unavailable,
            "UNAVAILABLE",
            "a required service is unavailable",
        ),
        DomainError::InvalidInput { .. } => {
            ClientError::new(ErrorKind::InvalidInput, "INVALID_INPUT", "invalid input")
        }
        DomainError::Unauthorized { .. } => {
            ClientError::new(ErrorKind::Forbidden, "UNAUTHORIZED", "not authorized")
        }
    }
}
