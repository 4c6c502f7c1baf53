//! Pagination strategies for multi-page fetches.
//!
//! A strategy computes the query parameters of the next request and decides,
//! from each decoded response, whether another page exists. All three
//! strategies advance their own cursor inside
//! [`PaginationStrategy::parse_response`], so a caller only loops:
//!
//! ```text
//! loop {
//!     fetch(strategy.build_query_params());
//!     strategy.parse_response(&page)?;
//!     if !strategy.has_next() { break }
//! }
//! ```
//!
//! State is created fresh for every fetch sequence via [`PaginationConfig::build`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::json::value_at_path;
use crate::{Error, Result};

const DEFAULT_PAGE_SIZE: u64 = 20;

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

fn default_items_path() -> String {
    "data".to_string()
}

/// Continuation algorithm for one paged fetch sequence.
pub trait PaginationStrategy: Send {
    /// Parameters to merge into the next request.
    fn build_query_params(&self) -> BTreeMap<String, String>;

    /// Update the cursor state from a decoded response body.
    fn parse_response(&mut self, response: &Value) -> Result<()>;

    /// Whether another page should be requested.
    fn has_next(&self) -> bool;
}

/// Pagination configuration, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PaginationConfig {
    Page(PageBasedConfig),
    Offset(OffsetBasedConfig),
    Cursor(CursorBasedConfig),
}

impl PaginationConfig {
    /// Fresh strategy state for a new fetch sequence.
    pub fn build(&self) -> Box<dyn PaginationStrategy> {
        match self {
            Self::Page(c) => Box::new(PageBasedPagination::new(c.clone())),
            Self::Offset(c) => Box::new(OffsetBasedPagination::new(c.clone())),
            Self::Cursor(c) => Box::new(CursorBasedPagination::new(c.clone())),
        }
    }

    /// Path to the item array inside each page.
    pub fn items_path(&self) -> &str {
        match self {
            Self::Page(c) => &c.items_path,
            Self::Offset(c) => &c.items_path,
            Self::Cursor(c) => &c.items_path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Page(_) => "page",
            Self::Offset(_) => "offset",
            Self::Cursor(_) => "cursor",
        }
    }
}

/// Page-number pagination settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageBasedConfig {
    pub page_param: String,
    pub size_param: String,
    pub page_size: u64,
    /// Path to the total page count in the response.
    pub total_pages_path: String,
    pub items_path: String,
}

impl Default for PageBasedConfig {
    fn default() -> Self {
        Self {
            page_param: "page".to_string(),
            size_param: "size".to_string(),
            page_size: default_page_size(),
            total_pages_path: "metadata.pages".to_string(),
            items_path: default_items_path(),
        }
    }
}

/// Offset/limit pagination settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetBasedConfig {
    pub offset_param: String,
    pub limit_param: String,
    pub page_size: u64,
    /// Path to the boolean "more data" flag in the response.
    pub has_more_path: String,
    pub items_path: String,
}

impl Default for OffsetBasedConfig {
    fn default() -> Self {
        Self {
            offset_param: "offset".to_string(),
            limit_param: "limit".to_string(),
            page_size: default_page_size(),
            has_more_path: "has_more".to_string(),
            items_path: default_items_path(),
        }
    }
}

/// Opaque-cursor pagination settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorBasedConfig {
    pub cursor_param: String,
    pub size_param: String,
    pub page_size: u64,
    pub next_cursor_path: String,
    pub has_more_path: String,
    pub items_path: String,
}

impl Default for CursorBasedConfig {
    fn default() -> Self {
        Self {
            cursor_param: "cursor".to_string(),
            size_param: "size".to_string(),
            page_size: default_page_size(),
            next_cursor_path: "next_cursor".to_string(),
            has_more_path: "has_next_page".to_string(),
            items_path: default_items_path(),
        }
    }
}

fn ensure_object(response: &Value) -> Result<()> {
    if response.is_object() {
        Ok(())
    } else {
        Err(Error::pagination("response is not a JSON object"))
    }
}

fn as_count(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

fn flag_at(response: &Value, path: &str) -> bool {
    value_at_path(response, path)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Page-number strategy. Pages start at 1.
#[derive(Debug, Clone)]
pub struct PageBasedPagination {
    config: PageBasedConfig,
    current_page: u64,
    total_pages: u64,
    has_more: bool,
}

impl PageBasedPagination {
    pub fn new(config: PageBasedConfig) -> Self {
        Self {
            config,
            current_page: 1,
            total_pages: 0,
            has_more: false,
        }
    }

    /// The page the next request asks for.
    pub fn current_page(&self) -> u64 {
        self.current_page
    }

    pub fn total_pages(&self) -> u64 {
        self.total_pages
    }
}

impl PaginationStrategy for PageBasedPagination {
    fn build_query_params(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (self.config.page_param.clone(), self.current_page.to_string()),
            (self.config.size_param.clone(), self.config.page_size.to_string()),
        ])
    }

    fn parse_response(&mut self, response: &Value) -> Result<()> {
        ensure_object(response)?;
        if let Some(pages) = value_at_path(response, &self.config.total_pages_path).and_then(as_count)
        {
            self.total_pages = pages;
        }

        self.has_more = self.current_page < self.total_pages;
        if self.has_more {
            self.current_page += 1;
        }
        Ok(())
    }

    fn has_next(&self) -> bool {
        self.has_more
    }
}

/// Offset/limit strategy. The offset starts at 0.
#[derive(Debug, Clone)]
pub struct OffsetBasedPagination {
    config: OffsetBasedConfig,
    current_offset: u64,
    has_more: bool,
}

impl OffsetBasedPagination {
    pub fn new(config: OffsetBasedConfig) -> Self {
        Self {
            config,
            current_offset: 0,
            has_more: false,
        }
    }

    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }
}

impl PaginationStrategy for OffsetBasedPagination {
    fn build_query_params(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (self.config.offset_param.clone(), self.current_offset.to_string()),
            (self.config.limit_param.clone(), self.config.page_size.to_string()),
        ])
    }

    /// Reads the has-more flag and advances the offset by one page,
    /// whatever the flag says.
    fn parse_response(&mut self, response: &Value) -> Result<()> {
        ensure_object(response)?;
        self.has_more = flag_at(response, &self.config.has_more_path);
        self.current_offset += self.config.page_size;
        Ok(())
    }

    fn has_next(&self) -> bool {
        self.has_more
    }
}

/// Opaque-cursor strategy. The cursor starts empty.
#[derive(Debug, Clone)]
pub struct CursorBasedPagination {
    config: CursorBasedConfig,
    current_cursor: String,
    has_more: bool,
}

impl CursorBasedPagination {
    pub fn new(config: CursorBasedConfig) -> Self {
        Self {
            config,
            current_cursor: String::new(),
            has_more: false,
        }
    }

    pub fn current_cursor(&self) -> &str {
        &self.current_cursor
    }
}

impl PaginationStrategy for CursorBasedPagination {
    fn build_query_params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::from([(
            self.config.size_param.clone(),
            self.config.page_size.to_string(),
        )]);
        if !self.current_cursor.is_empty() {
            params.insert(self.config.cursor_param.clone(), self.current_cursor.clone());
        }
        params
    }

    fn parse_response(&mut self, response: &Value) -> Result<()> {
        ensure_object(response)?;
        self.current_cursor = value_at_path(response, &self.config.next_cursor_path)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.has_more = flag_at(response, &self.config.has_more_path);
        Ok(())
    }

    /// A missing next cursor ends the sequence even if the flag says otherwise.
    fn has_next(&self) -> bool {
        self.has_more && !self.current_cursor.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_based_total_pages() {
        let mut strategy = PageBasedPagination::new(PageBasedConfig::default());
        let response = json!({"data": [], "metadata": {"pages": 5}});

        for page in 1..=5u64 {
            assert_eq!(strategy.current_page(), page);
            assert_eq!(strategy.build_query_params()["page"], page.to_string());
            strategy.parse_response(&response).unwrap();
            assert_eq!(strategy.has_next(), page < 5, "page {page}");
        }
        assert_eq!(strategy.total_pages(), 5);
        assert_eq!(strategy.current_page(), 5);
    }

    #[test]
    fn test_page_based_missing_total_stops() {
        let mut strategy = PageBasedPagination::new(PageBasedConfig::default());
        strategy.parse_response(&json!({"data": [1]})).unwrap();
        assert!(!strategy.has_next());
        assert_eq!(strategy.current_page(), 1);
    }

    #[test]
    fn test_page_based_custom_params() {
        let config = PageBasedConfig {
            page_param: "p".into(),
            size_param: "per_page".into(),
            page_size: 50,
            ..Default::default()
        };
        let strategy = PageBasedPagination::new(config);
        let params = strategy.build_query_params();
        assert_eq!(params["p"], "1");
        assert_eq!(params["per_page"], "50");
    }

    #[test]
    fn test_offset_always_advances() {
        let config = OffsetBasedConfig {
            page_size: 25,
            ..Default::default()
        };
        let mut strategy = OffsetBasedPagination::new(config);
        assert_eq!(strategy.build_query_params()["offset"], "0");

        strategy.parse_response(&json!({"has_more": true})).unwrap();
        assert_eq!(strategy.current_offset(), 25);
        assert!(strategy.has_next());

        strategy.parse_response(&json!({"has_more": false})).unwrap();
        assert_eq!(strategy.current_offset(), 50);
        assert!(!strategy.has_next());

        strategy.parse_response(&json!({})).unwrap();
        assert_eq!(strategy.current_offset(), 75);
        assert!(!strategy.has_next());
        assert_eq!(strategy.build_query_params()["limit"], "25");
    }

    #[test]
    fn test_cursor_empty_cursor_terminates() {
        let mut strategy = CursorBasedPagination::new(CursorBasedConfig::default());
        strategy
            .parse_response(&json!({"has_next_page": true, "next_cursor": ""}))
            .unwrap();
        assert!(!strategy.has_next());
    }

    #[test]
    fn test_cursor_missing_cursor_terminates() {
        let mut strategy = CursorBasedPagination::new(CursorBasedConfig::default());
        strategy
            .parse_response(&json!({"has_next_page": true, "next_cursor": "abc"}))
            .unwrap();
        assert!(strategy.has_next());

        strategy.parse_response(&json!({"has_next_page": true})).unwrap();
        assert!(!strategy.has_next());
        assert_eq!(strategy.current_cursor(), "");
    }

    #[test]
    fn test_cursor_query_params() {
        let mut strategy = CursorBasedPagination::new(CursorBasedConfig::default());
        let first = strategy.build_query_params();
        assert!(!first.contains_key("cursor"));
        assert_eq!(first["size"], "20");

        strategy
            .parse_response(&json!({"has_next_page": true, "next_cursor": "tok-2"}))
            .unwrap();
        assert_eq!(strategy.build_query_params()["cursor"], "tok-2");
    }

    #[test]
    fn test_nested_paths() {
        let config = CursorBasedConfig {
            next_cursor_path: "paging.cursors.after".into(),
            has_more_path: "paging.more".into(),
            ..Default::default()
        };
        let mut strategy = CursorBasedPagination::new(config);
        strategy
            .parse_response(&json!({"paging": {"cursors": {"after": "x"}, "more": true}}))
            .unwrap();
        assert!(strategy.has_next());
    }

    #[test]
    fn test_non_object_response_is_error() {
        let mut strategy = OffsetBasedPagination::new(OffsetBasedConfig::default());
        let err = strategy.parse_response(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, Error::Pagination(_)));
        assert_eq!(strategy.current_offset(), 0);
    }

    #[test]
    fn test_config_deserialize_with_defaults() {
        let config: PaginationConfig =
            serde_json::from_value(json!({"type": "cursor", "page_size": 100})).unwrap();
        match &config {
            PaginationConfig::Cursor(c) => {
                assert_eq!(c.page_size, 100);
                assert_eq!(c.next_cursor_path, "next_cursor");
            }
            other => panic!("unexpected config: {other:?}"),
        }
        assert_eq!(config.items_path(), "data");
        assert_eq!(config.kind(), "cursor");
    }
}
