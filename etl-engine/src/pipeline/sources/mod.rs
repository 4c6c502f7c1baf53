//! Data source implementations.

mod paginated;
mod rest;

pub use paginated::{DEFAULT_MAX_PAGES, PaginatedSource};
pub use rest::{RestSource, RestSourceConfig};

use std::sync::Arc;

use super::traits::DataSource;
use crate::Result;

/// Build the REST source described by `config`, paginated when it carries
/// a pagination block.
pub fn rest_api(config: RestSourceConfig) -> Result<Arc<dyn DataSource>> {
    let pagination = config.pagination.clone();
    let source = RestSource::new(config)?;
    Ok(match pagination {
        Some(pagination) => Arc::new(PaginatedSource::new(source, pagination)),
        None => Arc::new(source),
    })
}
