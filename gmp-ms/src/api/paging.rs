//! Page request parameters shared by list endpoints

use crate::query::{PageRequest, QueryError, SortDir};
use serde::Deserialize;

/// Page size used when the caller gives none
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// `page` (0-based), `page_size`, `sort_by`, `sort_dir`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
}

impl PageParams {
    /// None of the paging or sort parameters were given
    pub fn is_unpaged(&self) -> bool {
        self.page.is_none()
            && self.page_size.is_none()
            && self.sort_by.is_none()
            && self.sort_dir.is_none()
    }

    /// Build a request; `default_sort` applies only when `sort_by` is absent
    pub fn to_request(
        &self,
        default_sort: &str,
        default_dir: SortDir,
    ) -> Result<PageRequest, QueryError> {
        let page = non_negative("page", self.page)?.unwrap_or(0);
        let page_size = non_negative("page_size", self.page_size)?.unwrap_or(DEFAULT_PAGE_SIZE);

        let sort_by = self
            .sort_by
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let dir = match self.sort_dir.as_deref() {
            Some(raw) => SortDir::parse(raw).ok_or_else(|| {
                QueryError::InvalidPageRequest(format!("sort_dir must be asc or desc, got '{}'", raw))
            })?,
            None if sort_by.is_none() => default_dir,
            None => SortDir::Asc,
        };

        Ok(PageRequest::new(page, page_size).sorted_by(sort_by.unwrap_or(default_sort), dir))
    }
}

fn non_negative(name: &str, value: Option<i64>) -> Result<Option<usize>, QueryError> {
    match value {
        Some(v) if v < 0 => Err(QueryError::InvalidPageRequest(format!(
            "{} must not be negative",
            name
        ))),
        Some(v) => Ok(Some(v as usize)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let request = PageParams::default()
            .to_request("updated_at", SortDir::Desc)
            .unwrap();
        assert_eq!(request.page, 0);
        assert_eq!(request.page_size, DEFAULT_PAGE_SIZE);
        let sort = request.sort.unwrap();
        assert_eq!(sort.field, "updated_at");
        assert_eq!(sort.dir, SortDir::Desc);
    }

    #[test]
    fn test_explicit_sort_defaults_ascending() {
        let params = PageParams {
            sort_by: Some("last_name".into()),
            ..Default::default()
        };
        let sort = params.to_request("updated_at", SortDir::Desc).unwrap().sort.unwrap();
        assert_eq!(sort.field, "last_name");
        assert_eq!(sort.dir, SortDir::Asc);
    }

    #[test]
    fn test_negative_page_rejected() {
        let params = PageParams {
            page: Some(-1),
            ..Default::default()
        };
        assert!(matches!(
            params.to_request("id", SortDir::Asc),
            Err(QueryError::InvalidPageRequest(_))
        ));
    }

    #[test]
    fn test_bad_sort_dir_rejected() {
        let params = PageParams {
            sort_dir: Some("sideways".into()),
            ..Default::default()
        };
        assert!(params.to_request("id", SortDir::Asc).is_err());
    }

    #[test]
    fn test_unpaged_detection() {
        assert!(PageParams::default().is_unpaged());
        let params = PageParams {
            page_size: Some(4),
            ..Default::default()
        };
        assert!(!params.is_unpaged());
    }

    #[test]
    fn test_lone_sort_param_is_not_unpaged() {
        let dir_only = PageParams {
            sort_dir: Some("asc".into()),
            ..Default::default()
        };
        assert!(!dir_only.is_unpaged());

        let field_only = PageParams {
            sort_by: Some("created_at".into()),
            ..Default::default()
        };
        assert!(!field_only.is_unpaged());

        // Direction alone keeps the default sort field
        let sort = dir_only.to_request("created_at", SortDir::Desc).unwrap().sort.unwrap();
        assert_eq!(sort.field, "created_at");
        assert_eq!(sort.dir, SortDir::Asc);
    }
}
