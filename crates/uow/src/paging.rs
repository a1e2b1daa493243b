//! Page requests and page results.

use serde::{Deserialize, Serialize};

use crate::{RepoError, RepoResult};

/// Default number of items per page.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Zero-based page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub index: usize,
    pub size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            index: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(index: usize, size: usize) -> Self {
        Self { index, size }
    }

    /// Validate the request and return the number of rows to skip.
    ///
    /// # Errors
    /// [`RepoError::InvalidArgument`] when `size` is zero or
    /// `index * size` overflows.
    pub fn skip(&self) -> RepoResult<usize> {
        if self.size == 0 {
            return Err(RepoError::invalid("page_size", "must be greater than zero"));
        }
        self.index.checked_mul(self.size).ok_or_else(|| {
            RepoError::invalid(
                "page_index",
                format!("page {} of size {} is out of range", self.index, self.size),
            )
        })
    }
}

/// One page of a filtered, ordered result set.
///
/// `total_count` is measured before pagination. A page past the end has no
/// items and is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedList<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub page_index: usize,
    pub page_size: usize,
}

impl<T> PagedList<T> {
    /// Slice one page out of the full result set.
    pub(crate) fn from_rows(rows: Vec<T>, page: PageRequest) -> RepoResult<Self> {
        let skip = page.skip()?;
        let total_count = rows.len();
        let items = rows.into_iter().skip(skip).take(page.size).collect();
        Ok(Self {
            items,
            total_count,
            page_index: page.index,
            page_size: page.size,
        })
    }

    pub fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            return 0;
        }
        self.total_count.div_ceil(self.page_size)
    }

    pub fn has_previous_page(&self) -> bool {
        self.page_index > 0
    }

    pub fn has_next_page(&self) -> bool {
        self.page_index.saturating_add(1) < self.total_pages()
    }

    /// Apply `f` to every item, keeping the page metadata.
    pub fn map<R>(self, f: impl FnMut(T) -> R) -> PagedList<R> {
        PagedList {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page_index: self.page_index,
            page_size: self.page_size,
        }
    }
}
