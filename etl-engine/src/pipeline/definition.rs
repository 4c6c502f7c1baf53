//! Pipeline composition and execution.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use super::context::ExecutionContext;
use super::traits::{ConfigMap, DataSource, Destination, Transformer};
use crate::{Error, Result};

/// The three sequential stages of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Transform,
    Store,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Transform => "transform",
            Self::Store => "store",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type name and configuration of one pipeline component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentInfo {
    #[serde(rename = "type")]
    pub component_type: String,
    pub config: ConfigMap,
}

/// Diagnostic snapshot of a pipeline's components.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineComponents {
    pub source: ComponentInfo,
    pub transformer: ComponentInfo,
    pub destination: ComponentInfo,
}

/// One bound source, transformer and destination.
///
/// Components are immutable after construction; a pipeline may be shared
/// between any number of concurrent runs.
#[derive(Clone)]
pub struct Pipeline {
    source: Arc<dyn DataSource>,
    transformer: Arc<dyn Transformer>,
    destination: Arc<dyn Destination>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("source", &self.source.component_type())
            .field("transformer", &self.transformer.component_type())
            .field("destination", &self.destination.component_type())
            .finish()
    }
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn DataSource>,
        transformer: Arc<dyn Transformer>,
        destination: Arc<dyn Destination>,
    ) -> Self {
        Self {
            source,
            transformer,
            destination,
        }
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Run fetch, transform and store in order.
    ///
    /// The first failing stage ends the run; later stages are not invoked.
    /// Stage failures are wrapped in [`Error::Stage`].
    pub async fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        let started = Instant::now();

        if ctx.is_cancelled() {
            return Err(Error::at_stage(Stage::Fetch, Error::Cancelled));
        }

        let stage_start = Instant::now();
        let fetched = self
            .source
            .fetch(ctx)
            .await
            .map_err(|e| Error::at_stage(Stage::Fetch, e))?;
        debug!(
            stage = %Stage::Fetch,
            source = self.source.component_type(),
            bytes = fetched.len(),
            elapsed_ms = stage_start.elapsed().as_millis() as u64,
            "Stage complete"
        );

        let stage_start = Instant::now();
        let transformed = self
            .transformer
            .transform(&fetched)
            .map_err(|e| Error::at_stage(Stage::Transform, e))?;
        debug!(
            stage = %Stage::Transform,
            transformer = self.transformer.component_type(),
            bytes = transformed.len(),
            elapsed_ms = stage_start.elapsed().as_millis() as u64,
            "Stage complete"
        );

        if ctx.is_cancelled() {
            warn!("Run cancelled before store");
            return Err(Error::at_stage(Stage::Store, Error::Cancelled));
        }

        let stage_start = Instant::now();
        self.destination
            .store(ctx, &transformed)
            .await
            .map_err(|e| Error::at_stage(Stage::Store, e))?;
        debug!(
            stage = %Stage::Store,
            destination = self.destination.component_type(),
            bytes = transformed.len(),
            elapsed_ms = stage_start.elapsed().as_millis() as u64,
            "Stage complete"
        );

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline run complete"
        );
        Ok(())
    }

    pub fn get_components(&self) -> PipelineComponents {
        PipelineComponents {
            source: ComponentInfo {
                component_type: self.source.component_type().to_string(),
                config: self.source.source_config(),
            },
            transformer: ComponentInfo {
                component_type: self.transformer.component_type().to_string(),
                config: self.transformer.transform_config(),
            },
            destination: ComponentInfo {
                component_type: self.destination.component_type().to_string(),
                config: self.destination.dest_config(),
            },
        }
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    pub fn transformer(&self) -> &Arc<dyn Transformer> {
        &self.transformer
    }

    pub fn destination(&self) -> &Arc<dyn Destination> {
        &self.destination
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    source: Option<Arc<dyn DataSource>>,
    transformer: Option<Arc<dyn Transformer>>,
    destination: Option<Arc<dyn Destination>>,
}

impl PipelineBuilder {
    pub fn source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn destination(mut self, destination: Arc<dyn Destination>) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Build the pipeline; every stage must be set.
    pub fn build(self) -> Result<Pipeline> {
        let source = self.source.ok_or(Error::MissingComponent("source"))?;
        let transformer = self
            .transformer
            .ok_or(Error::MissingComponent("transformer"))?;
        let destination = self
            .destination
            .ok_or(Error::MissingComponent("destination"))?;
        Ok(Pipeline::new(source, transformer, destination))
    }
}
