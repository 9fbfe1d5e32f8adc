//! fgaiam-backends: Clients for the systems the pipeline composes
//!
//! This crate provides the backend abstraction, including:
//! - Capability traits for the authorization engine, identity provider and control plane
//! - Network clients (OpenFGA over gRPC, Keycloak admin API, Kubernetes-style control plane)
//! - In-memory implementation for testing
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              fgaiam-backends                 │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs        - Backend traits & types  │
//! │  openfga.rs       - Authorization engine    │
//! │  keycloak.rs      - Identity provider       │
//! │  control_plane.rs - Accounts & workspaces   │
//! │  memory.rs        - In-memory backend       │
//! └─────────────────────────────────────────────┘
//! ```

pub mod control_plane;
pub mod error;
pub mod keycloak;
pub mod memory;
pub mod openfga;
pub mod traits;

// Re-export commonly used types
pub use control_plane::{ControlPlaneClient, ControlPlaneClientConfig};
pub use error::{BackendError, BackendResult, WRITE_FAILED_CODE};
pub use keycloak::{KeycloakClient, KeycloakClientConfig};
pub use memory::MemoryBackend;
pub use openfga::{OpenFgaClient, OpenFgaClientConfig};
pub use traits::{
    Account, AuthorizationEngine, AuthorizationModelRef, ControlPlane, IdentityProvider,
    IdentityRecord, ListUsersRequest, ObjectRef, StorePage, StoreRef, TupleKey, UserRef,
    Workspace,
};
