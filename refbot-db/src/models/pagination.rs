//! Pagination types

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Pagination parameters (1-indexed pages)
///
/// Only constructed through `try_new`, so both fields are always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u32,
    per_page: u32,
}

impl Pagination {
    /// Create pagination, rejecting non-positive page or page size.
    ///
    /// Takes signed input so callers forwarding user-supplied numbers get a
    /// validation error instead of a silent clamp.
    pub fn try_new(page: i64, per_page: i64) -> Result<Self, ValidationError> {
        if page < 1 || per_page < 1 {
            return Err(ValidationError::InvalidPage {
                page,
                page_size: per_page,
            });
        }
        match (u32::try_from(page), u32::try_from(per_page)) {
            (Ok(page), Ok(per_page)) => Ok(Self { page, per_page }),
            _ => Err(ValidationError::PageOutOfRange {
                page,
                page_size: per_page,
            }),
        }
    }

    /// Page number (1-indexed)
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Items per page
    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Calculate SQL OFFSET value.
    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1).saturating_mul(i64::from(self.per_page))
    }

    /// Get LIMIT value.
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }
}

/// A page of results with the total match count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    /// Items for current page
    pub items: Vec<T>,
    /// Total count across all pages
    pub total: i64,
    /// Current page number
    pub page: u32,
    /// Items per page
    pub per_page: u32,
}

impl<T> Paginated<T> {
    /// Calculate total number of pages.
    pub fn total_pages(&self) -> u32 {
        if self.total <= 0 || self.per_page == 0 {
            1
        } else {
            let per_page = i64::from(self.per_page);
            u32::try_from((self.total + per_page - 1) / per_page)
                .unwrap_or(u32::MAX)
                .max(1)
        }
    }

    /// Check if there's a next page.
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    /// Check if there's a previous page.
    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_calculation() {
        let p = Pagination::try_new(1, 10).unwrap();
        assert_eq!(p.offset(), 0);

        let p = Pagination::try_new(2, 10).unwrap();
        assert_eq!(p.offset(), 10);

        let p = Pagination::try_new(3, 25).unwrap();
        assert_eq!(p.offset(), 50);
        assert_eq!(p.limit(), 25);
    }

    #[test]
    fn rejects_non_positive() {
        assert_eq!(
            Pagination::try_new(0, 10),
            Err(ValidationError::InvalidPage {
                page: 0,
                page_size: 10
            })
        );
        assert!(Pagination::try_new(1, 0).is_err());
        assert!(Pagination::try_new(-3, 5).is_err());
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(
            Pagination::try_new(1, i64::MAX),
            Err(ValidationError::PageOutOfRange {
                page: 1,
                page_size: i64::MAX
            })
        );
        let p = Pagination::try_new(i64::from(u32::MAX), 1).unwrap();
        assert_eq!(p.page(), u32::MAX);
        assert_eq!(p.per_page(), 1);
    }

    #[test]
    fn total_pages() {
        let paginated: Paginated<()> = Paginated {
            items: vec![],
            total: 0,
            page: 1,
            per_page: 10,
        };
        assert_eq!(paginated.total_pages(), 1);

        let paginated: Paginated<()> = Paginated {
            items: vec![],
            total: 25,
            page: 1,
            per_page: 10,
        };
        assert_eq!(paginated.total_pages(), 3);
    }

    #[test]
    fn total_pages_with_zero_page_size() {
        let paginated: Paginated<()> = Paginated {
            items: vec![],
            total: 3,
            page: 1,
            per_page: 0,
        };
        assert_eq!(paginated.total_pages(), 1);
        assert!(!paginated.has_next());
    }

    #[test]
    fn has_next_prev() {
        let paginated: Paginated<()> = Paginated {
            items: vec![],
            total: 30,
            page: 2,
            per_page: 10,
        };
        assert!(paginated.has_next());
        assert!(paginated.has_prev());

        let paginated: Paginated<()> = Paginated {
            items: vec![],
            total: 30,
            page: 3,
            per_page: 10,
        };
        assert!(!paginated.has_next());
        assert!(paginated.has_prev());
    }
}
