// 📄 Pagination - 1-based pages shared by the library, history and favorites

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;
/// Far past any real table; keeps page * size inside i64 for SQL OFFSET
pub const MAX_PAGE: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub records: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(records: Vec<T>, total: usize, page: usize, page_size: usize) -> Self {
        Page {
            records,
            total,
            page,
            page_size,
            has_more: total > page.saturating_mul(page_size),
        }
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            records: self.records.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            has_more: self.has_more,
        }
    }
}

/// Clamp raw paging input: 1 <= page <= MAX_PAGE, 1 <= size <= MAX_PAGE_SIZE
pub fn normalize(page: Option<usize>, page_size: Option<usize>, default_size: usize) -> (usize, usize) {
    let page = page.filter(|p| *p > 0).unwrap_or(1).min(MAX_PAGE);
    let size = page_size
        .filter(|s| *s > 0)
        .unwrap_or(default_size)
        .min(MAX_PAGE_SIZE);
    (page, size)
}

/// Row offset of the first record on `page`
pub fn offset(page: usize, page_size: usize) -> usize {
    page.saturating_sub(1).saturating_mul(page_size)
}
