//! Pagination types for ledger and history queries.
//!
//! Queries over append-only data are page-numbered so a caller can stop
//! and resume an audit scan at any page.

use serde::{Deserialize, Serialize};

/// Largest page size a caller may request.
pub const MAX_PER_PAGE: u32 = 500;

/// Request parameters for paginated queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number (1-indexed).
    #[serde(default = "default_page")]
    pub page: u32,
    /// Number of items per page.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    50
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PageRequest {
    /// Creates a request, clamping the page to at least 1 and the size to `1..=MAX_PER_PAGE`.
    #[must_use]
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    /// Calculates the offset for queries.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    /// Returns the limit for queries.
    #[must_use]
    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }

    /// Request for the following page.
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            per_page: self.per_page,
        }
    }
}

/// Response wrapper for paginated data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse<T> {
    /// The items in the current page.
    pub data: Vec<T>,
    /// Pagination metadata.
    pub meta: PageMeta,
}

/// Pagination metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    /// Current page number.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
    /// Total number of items across all pages.
    pub total: u64,
    /// Total number of pages.
    pub total_pages: u32,
}

impl<T> PageResponse<T> {
    /// Creates a new paginated response.
    #[must_use]
    pub fn new(data: Vec<T>, request: PageRequest, total: u64) -> Self {
        let per_page = u64::from(request.per_page.max(1));
        let total_pages = u32::try_from(total.div_ceil(per_page).max(1)).unwrap_or(u32::MAX);

        Self {
            data,
            meta: PageMeta {
                page: request.page,
                per_page: request.per_page,
                total,
                total_pages,
            },
        }
    }

    /// Returns true if another page follows this one.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.meta.page < self.meta.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_clamps() {
        let request = PageRequest::new(0, 10_000);
        assert_eq!(request.page, 1);
        assert_eq!(request.per_page, MAX_PER_PAGE);
        assert_eq!(PageRequest::new(3, 0).per_page, 1);
    }

    #[test]
    fn test_offset_and_limit() {
        let request = PageRequest::new(3, 20);
        assert_eq!(request.offset(), 40);
        assert_eq!(request.limit(), 20);
        assert_eq!(request.next().offset(), 60);
    }

    #[test]
    fn test_total_pages() {
        let page = PageResponse::new(vec![1, 2], PageRequest::new(1, 2), 5);
        assert_eq!(page.meta.total_pages, 3);
        assert!(page.has_next());

        let empty: PageResponse<u8> = PageResponse::new(vec![], PageRequest::default(), 0);
        assert_eq!(empty.meta.total_pages, 1);
        assert!(!empty.has_next());
    }
}
