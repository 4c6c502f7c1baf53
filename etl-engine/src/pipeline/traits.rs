//! Capability contracts for the three pipeline stages.
//!
//! Sources, transformers and destinations are independent abstractions; a
//! concrete component implements exactly the one it provides.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::context::ExecutionContext;
use crate::Result;

/// Component configuration rendered for diagnostics.
pub type ConfigMap = Map<String, Value>;

/// Retrieves raw serialized data from an external system.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Registered type name of this source.
    fn component_type(&self) -> &'static str;

    /// Fetch one payload.
    ///
    /// Implementations should honor `ctx` cancellation; a source that ignores
    /// it cannot be interrupted by scheduler shutdown.
    async fn fetch(&self, ctx: &ExecutionContext) -> Result<Vec<u8>>;

    /// The source's configuration.
    fn source_config(&self) -> ConfigMap;
}

/// Maps or converts a serialized payload into another shape.
pub trait Transformer: Send + Sync {
    /// Registered type name of this transformer.
    fn component_type(&self) -> &'static str;

    fn transform(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// The transformer's configuration.
    fn transform_config(&self) -> ConfigMap;
}

/// Delivers a transformed payload to an external system.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Registered type name of this destination.
    fn component_type(&self) -> &'static str;

    async fn store(&self, ctx: &ExecutionContext, data: &[u8]) -> Result<()>;

    /// The destination's configuration.
    fn dest_config(&self) -> ConfigMap;
}
