//! Offset/limit pagination shared by every list operation.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 500;

/// Requested window into a result set.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    /// Build a window, applying the default and maximum limit.
    pub fn new(offset: Option<usize>, limit: Option<usize>) -> Self {
        Self {
            offset: offset.unwrap_or(0),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of results: `{items, total, limit, offset}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

impl<T> Page<T> {
    /// Cut a page out of an already filtered and ordered result set.
    pub fn from_vec(items: Vec<T>, request: PageRequest) -> Self {
        let total = items.len();
        let items = items
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();
        Self {
            items,
            total,
            limit: request.limit,
            offset: request.offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(PageRequest::new(None, Some(10_000)).limit, MAX_LIMIT);
        assert_eq!(PageRequest::new(None, Some(0)).limit, 1);
        assert_eq!(PageRequest::new(None, None).limit, DEFAULT_LIMIT);
    }

    #[test]
    fn test_page_past_end_is_empty_but_keeps_total() {
        let page = Page::from_vec((0..7).collect::<Vec<_>>(), PageRequest::new(Some(5), Some(5)));
        assert_eq!(page.items, vec![5, 6]);
        assert_eq!(page.total, 7);

        let page = Page::from_vec((0..7).collect::<Vec<_>>(), PageRequest::new(Some(20), Some(5)));
        assert!(page.items.is_empty());
        assert_eq!(page.total, 7);
    }
}
