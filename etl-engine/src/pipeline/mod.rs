//! Pipeline contracts, components and execution.

pub mod context;
pub mod definition;
pub mod destinations;
pub mod loader;
pub mod pagination;
pub mod sources;
pub mod traits;
pub mod transformers;

pub use context::ExecutionContext;
pub use definition::{ComponentInfo, Pipeline, PipelineBuilder, PipelineComponents, Stage};
pub use loader::PipelineLoader;
pub use pagination::{PaginationConfig, PaginationStrategy};
pub use traits::{ConfigMap, DataSource, Destination, Transformer};
