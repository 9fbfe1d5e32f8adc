//! Offset pagination over an ordered list.

use serde::{Deserialize, Serialize};

use crate::model::{PageInfo, PageSpec};

/// Fallback values for absent or non-positive page parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDefaults {
    pub limit: usize,
    pub page: usize,
}

impl Default for PageDefaults {
    fn default() -> Self {
        Self { limit: 10, page: 1 }
    }
}

/// Returns the requested page of `list` and its metadata.
///
/// `limit` and `page` come from `spec` when positive, otherwise from
/// `defaults`. The page covers `[(page - 1) * limit, min(offset + limit, total_count))`.
/// An offset at or past `total_count` yields an empty page.
pub fn paginate<T: Clone>(
    list: &[T],
    spec: Option<PageSpec>,
    defaults: PageDefaults,
    total_count: usize,
) -> (Vec<T>, PageInfo) {
    let spec = spec.unwrap_or_default();
    let limit = positive_or(spec.limit, defaults.limit);
    let page = positive_or(spec.page, defaults.page);

    let offset = (page - 1).saturating_mul(limit);
    let has_previous_page = page > 1;

    if offset >= total_count || offset >= list.len() {
        return (
            Vec::new(),
            PageInfo {
                count: 0,
                total_count,
                has_next_page: false,
                has_previous_page,
            },
        );
    }

    let end = offset.saturating_add(limit).min(total_count).min(list.len());
    let items = list[offset..end].to_vec();

    let info = PageInfo {
        count: items.len(),
        total_count,
        has_next_page: end < total_count,
        has_previous_page,
    };
    (items, info)
}

fn positive_or(value: Option<i64>, fallback: usize) -> usize {
    match value {
        Some(v) if v > 0 => usize::try_from(v).unwrap_or(usize::MAX),
        _ => fallback.max(1),
    }
}
