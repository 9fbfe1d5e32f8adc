//! Ordering and paging of listed users.

mod page;
mod sort;

pub use page::{paginate, PageDefaults};
pub use sort::sort_user_roles;
