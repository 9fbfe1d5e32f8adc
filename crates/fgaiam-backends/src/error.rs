//! Backend error types.

use thiserror::Error;

/// Name of the authorization engine in errors and logs.
pub const OPENFGA: &str = "openfga";
/// Name of the identity provider in errors and logs.
pub const KEYCLOAK: &str = "keycloak";
/// Name of the control plane in errors and logs.
pub const CONTROL_PLANE: &str = "control-plane";

/// Engine error code for rejected tuple writes and deletes.
pub const WRITE_FAILED_CODE: &str = "write_failed_due_to_invalid_input";

/// Errors returned by backend clients.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The request could not be sent or no response was received.
    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    /// Non-success HTTP status without a structured error body.
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Error reported by the authorization engine, with its HTTP-equivalent status.
    #[error("openfga error {code} (HTTP {status}): {message}")]
    Engine {
        status: u16,
        code: String,
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("failed to decode {service} response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },

    /// The client could not be built from its configuration.
    #[error("invalid {service} configuration: {message}")]
    Config {
        service: &'static str,
        message: String,
    },
}

impl BackendError {
    /// The dependency this error came from.
    pub fn service(&self) -> &'static str {
        match self {
            BackendError::Transport { service, .. }
            | BackendError::Status { service, .. }
            | BackendError::Decode { service, .. }
            | BackendError::Config { service, .. } => service,
            BackendError::Engine { .. } => OPENFGA,
        }
    }

    pub(crate) fn transport(service: &'static str, err: impl std::fmt::Display) -> Self {
        BackendError::Transport {
            service,
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(service: &'static str, err: impl std::fmt::Display) -> Self {
        BackendError::Decode {
            service,
            message: err.to_string(),
        }
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
