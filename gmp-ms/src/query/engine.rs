//! Page envelope, request model and the query engine front door

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default upper bound for `page_size`
pub const DEFAULT_MAX_PAGE_SIZE: usize = 100;

/// Query engine errors
#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    /// Malformed request (zero/oversized page, unknown field)
    #[error("Invalid page request: {0}")]
    InvalidPageRequest(String),

    /// The backing store could not be read
    #[error("Record lookup failed: {0}")]
    LookupFailed(String),
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    /// Accepts "asc"/"desc" in any case
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "asc" => Some(SortDir::Asc),
            "desc" => Some(SortDir::Desc),
            _ => None,
        }
    }
}

/// Single-field sort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub dir: SortDir,
}

/// Predicate kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Case-insensitive substring match
    Contains,
    /// Exact, case-sensitive match on the whole stored value
    Equals,
}

/// One conjunctive predicate over a named field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    pub fn contains(field: &str, value: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            op: FilterOp::Contains,
            value: value.into(),
        }
    }

    pub fn equals(field: &str, value: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            op: FilterOp::Equals,
            value: value.into(),
        }
    }

    /// Blank values do not constrain anything
    pub fn is_noop(&self) -> bool {
        self.value.trim().is_empty()
    }
}

/// A page request; `page` is 0-based
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub filters: Vec<Filter>,
    pub sort: Option<SortSpec>,
    pub page: usize,
    pub page_size: usize,
}

impl PageRequest {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            filters: Vec::new(),
            sort: None,
            page,
            page_size,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sorted_by(mut self, field: &str, dir: SortDir) -> Self {
        self.sort = Some(SortSpec {
            field: field.to_string(),
            dir,
        });
        self
    }

    /// Row offset of the first record on the requested page
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.page_size)
    }
}

/// Page envelope returned to every caller
///
/// `total` and `total_pages` describe the filtered set. Out-of-range pages
/// come back empty with `has_next = false`; they are never redirected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    /// Build an envelope, deriving the page count and navigation flags
    ///
    /// # Examples
    /// ```
    /// use gmp_ms::query::Page;
    ///
    /// // 10 records, 4 per page = 3 pages (4 + 4 + 2)
    /// let p: Page<u8> = Page::new(vec![0, 0], 2, 4, 10);
    /// assert_eq!(p.total_pages, 3);
    /// assert!(p.has_prev);
    /// assert!(!p.has_next);
    /// ```
    pub fn new(data: Vec<T>, page: usize, page_size: usize, total: usize) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total.div_ceil(page_size)
        };

        Self {
            data,
            page,
            page_size,
            total,
            total_pages,
            has_next: page.saturating_add(1) < total_pages,
            has_prev: page > 0,
        }
    }

    /// Wrap a bare list as one full page
    pub fn single(data: Vec<T>) -> Self {
        let total = data.len();
        Self {
            data,
            page: 0,
            page_size: total,
            total,
            total_pages: 1,
            has_next: false,
            has_prev: false,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total: self.total,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_prev: self.has_prev,
        }
    }
}

/// What a source hands back
#[derive(Debug, Clone, PartialEq)]
pub enum SourceResponse<T> {
    /// Source paginated itself
    Paged(Page<T>),
    /// Legacy shape: everything, no envelope
    Bare(Vec<T>),
}

impl<T> SourceResponse<T> {
    /// Normalize to an envelope; flags are recomputed for paged responses
    pub fn into_page(self) -> Page<T> {
        match self {
            SourceResponse::Paged(p) => Page::new(p.data, p.page, p.page_size, p.total),
            SourceResponse::Bare(list) => Page::single(list),
        }
    }
}

/// Backing record store consulted by the engine
#[async_trait]
pub trait RecordSource: Send + Sync {
    type Record: Send;

    async fn query(
        &self,
        request: &PageRequest,
    ) -> Result<SourceResponse<Self::Record>, QueryError>;
}

/// Validates requests and normalizes source responses
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine {
    max_page_size: usize,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAGE_SIZE)
    }
}

impl QueryEngine {
    pub fn new(max_page_size: usize) -> Self {
        Self {
            max_page_size: max_page_size.max(1),
        }
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    pub fn validate(&self, request: &PageRequest) -> Result<(), QueryError> {
        if request.page_size == 0 {
            return Err(QueryError::InvalidPageRequest(
                "page_size must be at least 1".to_string(),
            ));
        }
        if request.page_size > self.max_page_size {
            return Err(QueryError::InvalidPageRequest(format!(
                "page_size {} exceeds maximum {}",
                request.page_size, self.max_page_size
            )));
        }
        Ok(())
    }

    /// Serve one page from `source`
    pub async fn page<S: RecordSource>(
        &self,
        source: &S,
        request: &PageRequest,
    ) -> Result<Page<S::Record>, QueryError> {
        self.validate(request)?;
        let response = source.query(request).await?;
        Ok(response.into_page())
    }
}
