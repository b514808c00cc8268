// SPDX-License-Identifier: Apache-2.0
//! The paging contract shared by every repository.

use serde::{Deserialize, Serialize};

/// Field a listing may be sorted by.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Last mutation instant (the default primary key).
    UpdatedAt,
    /// Entity identity.
    Id,
    /// Drift detection instant (drift events only).
    DetectedAt,
    /// Latest heartbeat instant (instances only).
    LastSeenAt,
}

/// Sort direction.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDir {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// A page request: zero-based index, page size, optional sort override.
///
/// Without an override, listings sort by `{updated_at DESC, id ASC}`. The
/// identity tie-break is always applied so paging is stable even when many
/// rows share a timestamp.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct PageRequest {
    /// Zero-based page index.
    pub index: usize,
    /// Rows per page (minimum 1).
    pub size: usize,
    /// Optional sort override; `None` means `{updated_at DESC, id ASC}`.
    pub sort: Option<(SortKey, SortDir)>,
}

impl PageRequest {
    /// First page with the given size and default sort.
    #[must_use]
    pub fn first(size: usize) -> Self {
        Self { index: 0, size: size.max(1), sort: None }
    }

    /// Page `index` with the given size and default sort.
    #[must_use]
    pub fn at(index: usize, size: usize) -> Self {
        Self { index, size: size.max(1), sort: None }
    }

    /// Replace the sort override.
    #[must_use]
    pub fn sorted_by(mut self, key: SortKey, dir: SortDir) -> Self {
        self.sort = Some((key, dir));
        self
    }
}

/// One page of a listing, with totals for UI pagination.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Page<T> {
    /// Rows on this page.
    pub content: Vec<T>,
    /// Total matching rows across all pages.
    pub total_elements: usize,
    /// Total pages at the requested size.
    pub total_pages: usize,
    /// Zero-based index of this page.
    pub page_index: usize,
    /// Requested page size.
    pub page_size: usize,
}

impl<T> Page<T> {
    /// Slice a fully sorted result set into the requested page.
    #[must_use]
    pub fn from_sorted(rows: Vec<T>, request: PageRequest) -> Self {
        let size = request.size.max(1);
        let total_elements = rows.len();
        let total_pages = total_elements.div_ceil(size);
        let content = rows
            .into_iter()
            .skip(request.index.saturating_mul(size))
            .take(size)
            .collect();
        Self {
            content,
            total_elements,
            total_pages,
            page_index: request.index,
            page_size: size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_and_counts() {
        let page = Page::from_sorted((0..7).collect(), PageRequest::at(1, 3));
        assert_eq!(page.content, vec![3, 4, 5]);
        assert_eq!(page.total_elements, 7);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn out_of_range_page_is_empty() {
        let page = Page::from_sorted(vec![1, 2], PageRequest::at(5, 10));
        assert!(page.content.is_empty());
        assert_eq!(page.total_pages, 1);
    }
}
