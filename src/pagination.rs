/// Page metadata for list endpoints
use serde::{Serialize, Serializer};
use serde::ser::SerializeStruct;

/// Page size used by the account and role list endpoints
pub const DEFAULT_PAGE_SIZE: i64 = 5;

/// A 1-based page request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRequest {
    pub page_index: i64,
    pub page_size: i64,
}

impl PageRequest {
    /// Page numbers below 1 are clamped to the first page
    pub fn new(page_index: i64, page_size: i64) -> Self {
        Self {
            page_index: page_index.max(1),
            page_size: page_size.max(1),
        }
    }

    /// Saturates for page numbers far past the end; such pages are simply empty
    pub fn offset(&self) -> i64 {
        (self.page_index - 1).saturating_mul(self.page_size)
    }
}

/// One page of items plus the position of that page in the whole list
#[derive(Debug, Clone, PartialEq)]
pub struct PaginatedList<T> {
    pub items: Vec<T>,
    pub page_index: i64,
    pub total_pages: i64,
}

impl<T> PaginatedList<T> {
    /// Wraps a page already fetched with `request.offset()` / `request.page_size`
    pub fn new(items: Vec<T>, count: i64, request: PageRequest) -> Self {
        let total_pages = (count + request.page_size - 1) / request.page_size;
        Self {
            items,
            page_index: request.page_index,
            total_pages,
        }
    }

    pub fn has_previous_page(&self) -> bool {
        self.page_index > 1
    }

    pub fn has_next_page(&self) -> bool {
        self.page_index < self.total_pages
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> PaginatedList<U> {
        PaginatedList {
            items: self.items.into_iter().map(f).collect(),
            page_index: self.page_index,
            total_pages: self.total_pages,
        }
    }
}

impl<T: Serialize> Serialize for PaginatedList<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PaginatedList", 5)?;
        state.serialize_field("dataList", &self.items)?;
        state.serialize_field("pageIndex", &self.page_index)?;
        state.serialize_field("hasNextPage", &self.has_next_page())?;
        state.serialize_field("hasPreviousPage", &self.has_previous_page())?;
        state.serialize_field("totalPages", &self.total_pages)?;
        state.end()
    }
}
