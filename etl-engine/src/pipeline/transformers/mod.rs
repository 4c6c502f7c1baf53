//! Transformer implementations.

mod chain;
mod mapper;

pub use chain::TransformChain;
pub use mapper::{FieldMapper, FieldMapping, FieldType, MapperConfig};
