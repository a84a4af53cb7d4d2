//! Page/sort query parsing and page metadata for list endpoints.
//!
//! Out-of-range or unparseable values fall back to defaults instead of failing
//! the request. Sort columns are whitelisted per resource so they can be
//! spliced into SQL.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Raw query string parameters, kept as strings so bad input degrades to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
    pub sort: &'static str,
    pub order: SortOrder,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            sort: "id",
            order: SortOrder::Asc,
        }
    }
}

impl PageQuery {
    /// `allowed_sorts` must contain `"id"`, the default column.
    pub fn resolve(&self, allowed_sorts: &[&'static str]) -> PageRequest {
        let mut req = PageRequest::default();

        if let Some(page) = self.page.as_deref().and_then(|p| p.parse::<u32>().ok()) {
            if page > 0 {
                req.page = page;
            }
        }
        if let Some(per_page) = self.per_page.as_deref().and_then(|p| p.parse::<u32>().ok()) {
            if (1..=MAX_PER_PAGE).contains(&per_page) {
                req.per_page = per_page;
            }
        }
        if let Some(sort) = self.sort.as_deref() {
            if let Some(col) = allowed_sorts.iter().find(|c| **c == sort) {
                req.sort = col;
            }
        }
        match self.order.as_deref() {
            Some("desc") => req.order = SortOrder::Desc,
            Some("asc") => req.order = SortOrder::Asc,
            _ => {}
        }

        req
    }
}

impl PageRequest {
    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }

    /// `ORDER BY` fragment; safe to splice because `sort` came from a whitelist.
    pub fn order_by(&self) -> String {
        format!("ORDER BY {} {}", self.sort, self.order.as_sql())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
    pub sort: String,
    pub order: SortOrder,
}

impl Pagination {
    pub fn new(req: &PageRequest, total: u64) -> Self {
        let total_pages = total.div_ceil(req.per_page as u64);
        Self {
            page: req.page,
            per_page: req.per_page,
            total,
            total_pages,
            has_next: (req.page as u64) < total_pages,
            has_prev: req.page > 1,
            sort: req.sort.to_string(),
            order: req.order,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, req: &PageRequest, total: u64) -> Self {
        Self {
            data,
            pagination: Pagination::new(req, total),
        }
    }
}
