use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::DocumentId;

pub const DEFAULT_PAGE_LIMIT: u32 = 12;
pub const MAX_PAGE_LIMIT: u32 = 50;

/// Traversal order over document ids, and therefore creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Desc,
    Asc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Result<Self, PaginationError> {
        match value {
            "desc" | "newest" | "-created_at" => Ok(Self::Desc),
            "asc" | "oldest" | "created_at" => Ok(Self::Asc),
            other => Err(PaginationError::InvalidSort(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Desc => "desc",
            Self::Asc => "asc",
        }
    }
}

/// A request for one page of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageRequest {
    /// Id of the last document seen; `None` starts from the beginning.
    pub cursor: Option<DocumentId>,
    pub limit: u32,
    pub sort: SortOrder,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            cursor: None,
            limit: DEFAULT_PAGE_LIMIT,
            sort: SortOrder::default(),
        }
    }
}

impl PageRequest {
    /// Builds a request from raw query parameters. Blank values count as absent.
    pub fn from_params(
        cursor: Option<&str>,
        limit: Option<&str>,
        sort: Option<&str>,
    ) -> Result<Self, PaginationError> {
        fn present(value: Option<&str>) -> Option<&str> {
            value.map(str::trim).filter(|v| !v.is_empty())
        }

        let cursor = present(cursor)
            .map(|raw| {
                DocumentId::parse(raw).map_err(|_| PaginationError::InvalidCursor(raw.to_string()))
            })
            .transpose()?;
        let limit = match present(limit) {
            None => DEFAULT_PAGE_LIMIT,
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|value| (1..=MAX_PAGE_LIMIT).contains(value))
                .ok_or_else(|| PaginationError::InvalidLimit(raw.to_string()))?,
        };
        let sort = present(sort)
            .map(SortOrder::parse)
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            cursor,
            limit,
            sort,
        })
    }

    pub fn with_cursor(&self, cursor: Option<DocumentId>) -> Self {
        Self {
            cursor,
            ..self.clone()
        }
    }

    /// Number of rows to fetch so that the presence of a next page is known.
    pub fn fetch_limit(&self) -> u32 {
        self.limit + 1
    }
}

/// One page of results plus the cursor for the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<DocumentId>,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Builds a page from rows fetched with [`PageRequest::fetch_limit`].
    pub fn from_overfetch(
        mut rows: Vec<T>,
        limit: u32,
        id_of: impl Fn(&T) -> &DocumentId,
    ) -> Self {
        let limit = limit as usize;
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_more {
            rows.last().map(|row| id_of(row).clone())
        } else {
            None
        };
        Self {
            items: rows,
            next_cursor,
            has_more,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("limit must be an integer between 1 and {MAX_PAGE_LIMIT} (got {0})")]
    InvalidLimit(String),
    #[error("sort must be 'asc' or 'desc' (got {0})")]
    InvalidSort(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IdGenerator;
    use chrono::{TimeZone, Utc};

    fn id(secs: i64) -> DocumentId {
        IdGenerator::new().next_id(Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap())
    }

    #[test]
    fn defaults_apply_for_missing_and_blank_params() {
        let request = PageRequest::from_params(Some(""), None, Some("  ")).expect("defaults");
        assert_eq!(request, PageRequest::default());
    }

    #[test]
    fn parses_all_params() {
        let cursor = id(3);
        let request =
            PageRequest::from_params(Some(cursor.as_str()), Some("5"), Some("oldest"))
                .expect("parse");
        assert_eq!(request.cursor, Some(cursor));
        assert_eq!(request.limit, 5);
        assert_eq!(request.sort, SortOrder::Asc);
        assert_eq!(request.fetch_limit(), 6);
    }

    #[test]
    fn rejects_out_of_range_limits() {
        for raw in ["0", "51", "-1", "ten"] {
            let err = PageRequest::from_params(None, Some(raw), None).unwrap_err();
            assert!(matches!(err, PaginationError::InvalidLimit(_)), "{raw}");
        }
    }

    #[test]
    fn rejects_bad_cursor_and_sort() {
        assert!(matches!(
            PageRequest::from_params(Some("xyz"), None, None),
            Err(PaginationError::InvalidCursor(_))
        ));
        assert!(matches!(
            PageRequest::from_params(None, None, Some("price")),
            Err(PaginationError::InvalidSort(_))
        ));
    }

    #[test]
    fn overfetch_sets_cursor_to_last_returned_item() {
        let rows: Vec<DocumentId> = (0..4).map(id).collect();
        let page = Page::from_overfetch(rows.clone(), 3, |row| row);
        assert!(page.has_more);
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.next_cursor.as_ref(), Some(&rows[2]));

        let page = Page::from_overfetch(rows[..3].to_vec(), 3, |row| row);
        assert!(!page.has_more);
        assert_eq!(page.next_cursor, None);
    }
}
