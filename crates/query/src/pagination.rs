//! Page and page-size resolution.

use serde::{Deserialize, Serialize};

use crate::config::PaginationSettings;
use crate::predicate::QueryBuilder;

/// A resolved page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number.
    pub page: u64,
    /// Rows per page.
    pub per_page: u64,
}

impl Page {
    /// Resolves a requested page against the pagination settings.
    ///
    /// Page numbers below 1 become 1. A missing or zero page size uses the
    /// default; anything above `max_per_page` is clamped.
    pub fn resolve(page: Option<u64>, per_page: Option<u64>, settings: &PaginationSettings) -> Self {
        let page = page.unwrap_or(1).max(1);
        let per_page = match per_page {
            Some(0) | None => settings.per_page,
            Some(n) => n,
        }
        .min(settings.max_per_page);
        Self { page, per_page }
    }

    /// Rows skipped before this page.
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    /// Appends the limit and offset to `query`.
    pub fn apply<Q: QueryBuilder + ?Sized>(&self, query: &mut Q) {
        query.limit(self.per_page);
        query.offset(self.offset());
    }
}
