//! Offset-based pagination
//!
//! Page tokens are opaque to callers but carry a plain item offset.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Pagination parameters supplied with list requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationOptions {
    /// Token returned by a previous call, empty for the first page
    #[serde(default)]
    pub page_token: String,

    /// Maximum number of items, 0 returns everything
    #[serde(default)]
    pub page_size: u32,
}

impl PaginationOptions {
    pub fn new(page_token: impl Into<String>, page_size: u32) -> Self {
        Self {
            page_token: page_token.into(),
            page_size,
        }
    }

    /// Decoded item offset
    pub fn offset(&self) -> Result<usize> {
        decode(&self.page_token)
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    /// Transform the items while keeping the continuation token
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_page_token: self.next_page_token,
        }
    }
}

/// Decode a page token into an item offset
pub fn decode(token: &str) -> Result<usize> {
    if token.is_empty() {
        return Ok(0);
    }
    token.parse::<usize>().map_err(|e| CoreError::InvalidPageToken {
        token: token.to_string(),
        reason: e.to_string(),
    })
}

pub fn encode(offset: usize) -> String {
    offset.to_string()
}

/// Cut one page out of a collection
///
/// A continuation token is only emitted when the page is full; a short page
/// marks the end of the results.
pub fn slice<T>(items: Vec<T>, offset: usize, page_size: u32) -> Result<Page<T>> {
    if page_size == 0 {
        return Ok(Page {
            items,
            next_page_token: None,
        });
    }

    if offset > items.len() {
        return Err(CoreError::invalid_argument(format!(
            "page offset {} is beyond the {} available items",
            offset,
            items.len()
        )));
    }

    let page_size = page_size as usize;
    let page: Vec<T> = items.into_iter().skip(offset).take(page_size).collect();
    let next_page_token = (page.len() == page_size).then(|| encode(offset + page_size));

    Ok(Page {
        items: page,
        next_page_token,
    })
}

/// Decode the options and slice in one step
pub fn paginate<T>(items: Vec<T>, options: &PaginationOptions) -> Result<Page<T>> {
    slice(items, options.offset()?, options.page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        for n in [0usize, 1, 2, 10, 999, usize::MAX] {
            assert_eq!(decode(&encode(n)).unwrap(), n);
        }
        assert_eq!(decode("").unwrap(), 0);
    }

    #[test]
    fn test_invalid_tokens() {
        for token in ["abc", "-1", "1.5", " 2"] {
            let err = decode(token).unwrap_err();
            assert!(matches!(err, CoreError::InvalidPageToken { .. }), "{token}");
        }
    }

    #[test]
    fn test_zero_page_size_returns_everything() {
        let page = slice(vec![1, 2, 3], 0, 0).unwrap();
        assert_eq!(page.items, vec![1, 2, 3]);
        assert_eq!(page.next_page_token, None);

        // offset is irrelevant when unpaged
        let page = slice(vec![1, 2, 3], 7, 0).unwrap();
        assert_eq!(page.items.len(), 3);
    }

    #[test]
    fn test_full_page_emits_token() {
        let page = slice(vec!["a", "b", "c", "d"], 0, 2).unwrap();
        assert_eq!(page.items, vec!["a", "b"]);
        assert_eq!(page.next_page_token.as_deref(), Some("2"));

        let page = slice(vec!["a", "b", "c", "d"], 2, 2).unwrap();
        assert_eq!(page.items, vec!["c", "d"]);
        // the next page is empty but this one was full
        assert_eq!(page.next_page_token.as_deref(), Some("4"));

        let page = slice(vec!["a", "b", "c", "d"], 4, 2).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.next_page_token, None);
    }

    #[test]
    fn test_short_page_never_emits_token() {
        let page = slice(vec![1, 2, 3], 1, 5).unwrap();
        assert_eq!(page.items, vec![2, 3]);
        assert_eq!(page.next_page_token, None);
    }

    #[test]
    fn test_offset_beyond_collection() {
        let err = slice(vec![1, 2, 3], 4, 1).unwrap_err();
        assert_eq!(err.code(), crate::Code::InvalidArgument);
    }

    #[test]
    fn test_paginate_with_options() {
        let options = PaginationOptions::new("1", 1);
        let page = paginate(vec!["x", "y", "z"], &options).unwrap();
        assert_eq!(page.items, vec!["y"]);
        assert_eq!(page.next_page_token.as_deref(), Some("2"));

        let page = page.map(str::to_uppercase);
        assert_eq!(page.items, vec!["Y".to_string()]);
    }
}
