//! Aggregation of role-assignee relationships.

use std::collections::HashMap;

/// A single `(user, role)` pair inferred from a relationship listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleAssignment {
    pub user_id: String,
    pub role_id: String,
}

/// Mapping from user id to the roles it holds, in discovery order.
///
/// Users keep the order in which they first appeared; each user's roles keep
/// the order in which roles were iterated. A role is recorded once per user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRoleMap {
    entries: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
}

impl UserRoleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `user_id` holds `role_id`.
    pub fn record(&mut self, user_id: &str, role_id: &str) {
        let position = match self.index.get(user_id) {
            Some(&position) => position,
            None => {
                self.entries.push((user_id.to_string(), Vec::new()));
                self.index
                    .insert(user_id.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };

        let roles = &mut self.entries[position].1;
        if !roles.iter().any(|r| r == role_id) {
            roles.push(role_id.to_string());
        }
    }

    /// Records a batch of assignments.
    pub fn extend<I>(&mut self, assignments: I)
    where
        I: IntoIterator<Item = RoleAssignment>,
    {
        for assignment in assignments {
            self.record(&assignment.user_id, &assignment.role_id);
        }
    }

    /// Roles held by `user_id`, if any.
    pub fn roles_of(&self, user_id: &str) -> Option<&[String]> {
        self.index
            .get(user_id)
            .map(|&position| self.entries[position].1.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates users and their roles in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(user, roles)| (user.as_str(), roles.as_slice()))
    }
}

impl IntoIterator for UserRoleMap {
    type Item = (String, Vec<String>);
    type IntoIter = std::vec::IntoIter<(String, Vec<String>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_in_two_roles_appears_once_with_both_in_iteration_order() {
        let mut map = UserRoleMap::new();
        map.record("alice@example.com", "owner");
        map.record("bob@example.com", "member");
        map.record("alice@example.com", "member");

        assert_eq!(map.len(), 2);
        assert_eq!(
            map.roles_of("alice@example.com"),
            Some(["owner".to_string(), "member".to_string()].as_slice())
        );
    }

    #[test]
    fn test_users_keep_first_appearance_order() {
        let mut map = UserRoleMap::new();
        map.extend([
            RoleAssignment {
                user_id: "carol".to_string(),
                role_id: "owner".to_string(),
            },
            RoleAssignment {
                user_id: "alice".to_string(),
                role_id: "owner".to_string(),
            },
            RoleAssignment {
                user_id: "carol".to_string(),
                role_id: "member".to_string(),
            },
        ]);

        let users: Vec<&str> = map.iter().map(|(user, _)| user).collect();
        assert_eq!(users, vec!["carol", "alice"]);
    }

    #[test]
    fn test_recording_same_role_twice_is_idempotent() {
        let mut map = UserRoleMap::new();
        map.record("alice", "owner");
        map.record("alice", "owner");

        assert_eq!(map.roles_of("alice").map(|r| r.len()), Some(1));
    }
}
