//! Role catalog.
//!
//! The roles that exist for each resource kind are static for the lifetime
//! of the process and come from the `roles` configuration section.

use std::collections::{BTreeMap, HashMap};

use fgaiam_domain::Role;

use crate::config::RoleSettings;

/// Source of the roles defined per resource kind.
pub trait RoleCatalog: Send + Sync {
    /// Roles defined for `kind`, in catalog order.
    fn roles_for(&self, kind: &str) -> Vec<Role>;

    /// Looks up one role of `kind`.
    fn find(&self, kind: &str, role_id: &str) -> Option<Role> {
        self.roles_for(kind).into_iter().find(|r| r.id == role_id)
    }
}

/// In-memory [`RoleCatalog`].
#[derive(Debug, Clone, Default)]
pub struct StaticRoleCatalog {
    roles: HashMap<String, Vec<Role>>,
}

impl StaticRoleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines the roles of `kind`, replacing any previous definition.
    pub fn with_roles(mut self, kind: impl Into<String>, roles: Vec<Role>) -> Self {
        self.roles.insert(kind.into(), roles);
        self
    }

    pub fn from_settings(settings: &BTreeMap<String, Vec<RoleSettings>>) -> Self {
        let roles = settings
            .iter()
            .map(|(kind, roles)| {
                (
                    kind.clone(),
                    roles.iter().map(RoleSettings::to_role).collect(),
                )
            })
            .collect();
        Self { roles }
    }
}

impl RoleCatalog for StaticRoleCatalog {
    fn roles_for(&self, kind: &str) -> Vec<Role> {
        self.roles.get(kind).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_are_scoped_by_kind() {
        let catalog = StaticRoleCatalog::new()
            .with_roles("account", vec![Role::new("owner"), Role::new("member")])
            .with_roles("project", vec![Role::new("viewer")]);

        let ids: Vec<String> = catalog
            .roles_for("account")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["owner", "member"]);
        assert!(catalog.roles_for("cluster").is_empty());
        assert!(catalog.find("account", "viewer").is_none());
        assert!(catalog.find("project", "viewer").is_some());
    }

    #[test]
    fn test_from_settings_fills_display_name() {
        let mut settings = BTreeMap::new();
        settings.insert(
            "account".to_string(),
            vec![RoleSettings {
                id: "owner".to_string(),
                display_name: String::new(),
                description: "Full access".to_string(),
            }],
        );

        let role = StaticRoleCatalog::from_settings(&settings)
            .find("account", "owner")
            .unwrap();
        assert_eq!(role.display_name, "owner");
        assert_eq!(role.description, "Full access");
    }
}
