pub mod cart;
pub mod catalog;
pub mod coupon;
pub mod delivery;
pub mod enums;
pub mod gamification;
pub mod loyalty;
pub mod order;
pub mod user;

pub use cart::*;
pub use catalog::*;
pub use coupon::*;
pub use delivery::*;
pub use enums::*;
pub use gamification::*;
pub use loyalty::*;
pub use order::*;
pub use user::*;

use serde::{Deserialize, Serialize};

pub type ModelId = uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// 1-based page request as sent in `?page=&limit=` query strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    #[serde(default = "first_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn first_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: DEFAULT_PAGE_SIZE }
    }
}

impl PageRequest {
    pub fn new(page: u64, limit: u64) -> Self {
        Self { page, limit }.normalized()
    }

    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            limit: self.limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page.max(1) - 1) * self.limit
    }

    /// Slices an already sorted collection.
    pub fn apply<T>(&self, items: Vec<T>) -> Page<T> {
        let req = self.normalized();
        let total = items.len() as u64;
        let items = items
            .into_iter()
            .skip(req.offset() as usize)
            .take(req.limit as usize)
            .collect();
        Page::new(items, total, req)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, req: PageRequest) -> Self {
        let pages = total.div_ceil(req.limit.max(1));
        Self {
            items,
            pagination: Pagination { page: req.page, limit: req.limit, total, pages },
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_slicing() {
        let page = PageRequest::new(2, 3).apply((1..=8).collect::<Vec<_>>());
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.pagination.total, 8);
        assert_eq!(page.pagination.pages, 3);
    }

    #[test]
    fn test_page_request_is_clamped() {
        let req = PageRequest { page: 0, limit: 10_000 }.normalized();
        assert_eq!(req.page, 1);
        assert_eq!(req.limit, MAX_PAGE_SIZE);
        assert_eq!(req.offset(), 0);
    }
}
