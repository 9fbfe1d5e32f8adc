//! Request-facing data model.
//!
//! This module contains:
//! - `types`: tenants, identities, roles, sort and page requests
//! - `assignments`: aggregation of role-assignee relationships per user

mod assignments;
mod types;

pub use assignments::{RoleAssignment, UserRoleMap};
pub use types::*;
