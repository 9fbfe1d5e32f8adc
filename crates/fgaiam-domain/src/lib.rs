//! fgaiam-domain: Core types for tenant-aware role resolution
//!
//! This crate contains the backend-independent parts of the pipeline:
//! - Request-facing data model (tenants, identities, role assignments, pages)
//! - Domain error taxonomy
//! - Generic TTL cache shared by store and identity lookups
//! - Deterministic sorting and pagination of listed users
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               fgaiam-domain                  │
//! ├─────────────────────────────────────────────┤
//! │  model/    - Tenants, users, roles, pages   │
//! │  cache/    - TTL cache (moka)               │
//! │  listing/  - Sorting and pagination         │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod listing;
pub mod model;

// Re-export commonly used types at the crate root
pub use cache::{TtlCache, TtlCacheConfig};
pub use error::{DomainError, DomainResult};
pub use model::{
    PageInfo, PageSpec, ResourceContext, Role, RoleAssignmentResult, RoleChange,
    RoleRemovalInput, RoleRemovalResult, SortDirection, SortField, SortSpec, TenantContext,
    UserConnection, UserIdentity, UserRoleMap, UserRoles,
};
