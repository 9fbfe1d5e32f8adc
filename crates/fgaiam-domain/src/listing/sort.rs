//! Deterministic ordering of users with roles.

use crate::model::{SortDirection, SortField, SortSpec, UserRoles};

/// Sorts `list` in place by `spec`, or by `default` when no spec is given.
///
/// Comparison is ordinal on the selected string field. A missing optional
/// field compares as the empty string, so it sorts first in ascending order.
/// The sort is stable.
pub fn sort_user_roles(list: &mut [UserRoles], spec: Option<SortSpec>, default: SortSpec) {
    if list.len() <= 1 {
        return;
    }

    let spec = spec.unwrap_or(default);
    list.sort_by(|a, b| {
        let ordering = sort_key(a, spec.field).cmp(sort_key(b, spec.field));
        match spec.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

fn sort_key(entry: &UserRoles, field: SortField) -> &str {
    let user = &entry.user;
    match field {
        SortField::UserId => &user.user_id,
        SortField::Email => &user.email,
        SortField::FirstName => user.first_name.as_deref().unwrap_or(""),
        SortField::LastName => user.last_name.as_deref().unwrap_or(""),
    }
}
