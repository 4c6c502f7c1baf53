//! Paginated wrapper around the REST source.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::rest::RestSource;
use crate::pipeline::context::ExecutionContext;
use crate::pipeline::pagination::PaginationConfig;
use crate::pipeline::traits::{ConfigMap, DataSource};
use crate::utils::json::value_at_path;
use crate::{Error, Result};

/// Upper bound on pages fetched in one sequence.
pub const DEFAULT_MAX_PAGES: usize = 1000;

/// Loops a [`RestSource`] while its pagination strategy reports more pages.
///
/// Every `fetch` starts a fresh strategy, so state never leaks between runs.
/// The items found at the configured `items_path` of each page are
/// concatenated into one JSON array.
pub struct PaginatedSource {
    inner: RestSource,
    pagination: PaginationConfig,
    max_pages: usize,
}

impl PaginatedSource {
    pub fn new(inner: RestSource, pagination: PaginationConfig) -> Self {
        Self {
            inner,
            pagination,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    fn collect_items(&self, page: &Value, items: &mut Vec<Value>) {
        match value_at_path(page, self.pagination.items_path()) {
            Some(Value::Array(page_items)) => items.extend(page_items.iter().cloned()),
            Some(other) => items.push(other.clone()),
            None => debug!(
                items_path = self.pagination.items_path(),
                "Page has no items at configured path"
            ),
        }
    }
}

#[async_trait]
impl DataSource for PaginatedSource {
    fn component_type(&self) -> &'static str {
        "rest_api"
    }

    async fn fetch(&self, ctx: &ExecutionContext) -> Result<Vec<u8>> {
        let mut strategy = self.pagination.build();
        let mut items = Vec::new();
        let mut pages = 0usize;

        loop {
            if ctx.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let params = strategy.build_query_params();
            let body = self.inner.fetch_with_params(ctx, &params).await?;
            let page: Value = serde_json::from_slice(&body)?;

            strategy.parse_response(&page)?;
            self.collect_items(&page, &mut items);
            pages += 1;

            if !strategy.has_next() {
                break;
            }
            if pages >= self.max_pages {
                warn!(
                    max_pages = self.max_pages,
                    url = %self.inner.config().url,
                    "Pagination stopped at page limit"
                );
                break;
            }
        }

        info!(
            pages,
            items = items.len(),
            kind = self.pagination.kind(),
            "Paginated fetch complete"
        );
        Ok(serde_json::to_vec(&Value::Array(items))?)
    }

    fn source_config(&self) -> ConfigMap {
        let mut map = self.inner.source_config();
        map.insert("max_pages".into(), json!(self.max_pages));
        map
    }
}
