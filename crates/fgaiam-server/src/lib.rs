//! fgaiam-server: Tenant-aware role and identity services
//!
//! This crate composes the backends into the services exposed upward:
//! - Tenant resolution from a verified token
//! - Authorization store lookup with caching
//! - Role listing and mutation with duplicate-write tolerance
//! - Identity enrichment with bounded parallel fan-out
//! - Field-level authorization gate (fail closed)
//! - Configuration, error classification and logging
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               fgaiam-server                  │
//! ├─────────────────────────────────────────────┤
//! │  config.rs        - Configuration           │
//! │  context.rs       - Request context         │
//! │  tenant.rs        - Tenant resolution       │
//! │  store.rs         - Store/model cache       │
//! │  catalog.rs       - Role catalog            │
//! │  roles.rs         - Role listing & writes   │
//! │  identity.rs      - Identity enrichment     │
//! │  service.rs       - User service facade     │
//! │  gate.rs          - Field authorization     │
//! │  errors.rs        - Client error mapping    │
//! │  observability.rs - Logging                 │
//! │  pipeline.rs      - Wiring from config      │
//! └─────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod config;
pub mod context;
pub mod errors;
pub mod gate;
pub mod identity;
pub mod observability;
pub mod pipeline;
pub mod roles;
pub mod service;
pub mod store;
pub mod tenant;

// Re-exports for convenience
pub use catalog::{RoleCatalog, StaticRoleCatalog};
pub use config::{ConfigLoadError, ServiceConfig};
pub use context::{RequestContext, TokenClaims};
pub use errors::{classify_error, ClientError, ErrorConfig, ErrorKind};
pub use gate::{AuthorizedDirective, FieldAuthorizationGate};
pub use identity::{IdentityEnrichmentConfig, IdentityEnrichmentService, IdentityLookup};
pub use pipeline::{Pipeline, PipelineInitError};
pub use roles::{RoleLister, RoleListingService};
pub use service::{UserService, UserServiceConfig};
pub use store::{AuthorizationStoreCache, StoreResolver};
pub use tenant::{TenantContextResolver, TenantResolver, TenantResolverConfig};
