//! Builds pipelines from their file definitions.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info};

use super::definition::Pipeline;
use super::traits::Transformer;
use super::transformers::TransformChain;
use crate::config::{PipelineDefinitionConfig, PipelinesFile};
use crate::registry::ComponentRegistry;
use crate::scheduler::JobConfig;
use crate::{Error, Result};

/// Assembles [`Pipeline`]s from a [`PipelinesFile`] using a component registry.
pub struct PipelineLoader {
    registry: Arc<ComponentRegistry>,
    definitions: PipelinesFile,
}

impl PipelineLoader {
    pub fn new(registry: Arc<ComponentRegistry>, definitions: PipelinesFile) -> Self {
        Self {
            registry,
            definitions,
        }
    }

    pub fn definitions(&self) -> &PipelinesFile {
        &self.definitions
    }

    /// Build the named pipeline.
    pub fn load(&self, name: &str) -> Result<Pipeline> {
        let definition = self
            .definitions
            .get(name)
            .ok_or_else(|| Error::PipelineNotFound(name.to_string()))?;
        self.build(name, definition)
    }

    /// Build every defined pipeline, keyed by name.
    ///
    /// Fails on the first pipeline that cannot be built.
    pub fn load_all(&self) -> Result<BTreeMap<String, Pipeline>> {
        let mut pipelines = BTreeMap::new();
        for (name, definition) in &self.definitions.pipelines {
            pipelines.insert(name.clone(), self.build(name, definition)?);
        }
        info!(count = pipelines.len(), "Loaded pipelines");
        Ok(pipelines)
    }

    /// Schedule entries of the named pipeline as job configurations.
    pub fn job_configs(&self, name: &str) -> Result<Vec<JobConfig>> {
        let definition = self
            .definitions
            .get(name)
            .ok_or_else(|| Error::PipelineNotFound(name.to_string()))?;

        Ok(definition
            .schedule
            .iter()
            .map(|spec| JobConfig {
                name: spec.name.clone(),
                schedule: spec.cron.clone(),
                enabled: spec.enabled,
                timeout_secs: spec.timeout_secs,
            })
            .collect())
    }

    /// Build one pipeline. Failures keep their error kind; the pipeline name
    /// is attached to the log record.
    fn build(&self, name: &str, definition: &PipelineDefinitionConfig) -> Result<Pipeline> {
        self.build_components(name, definition).inspect_err(|e| {
            error!(pipeline = name, error = %e, "Failed to build pipeline");
        })
    }

    fn build_components(
        &self,
        name: &str,
        definition: &PipelineDefinitionConfig,
    ) -> Result<Pipeline> {
        let source = self
            .registry
            .sources
            .create(&definition.source.component_type, &definition.source.config)?;

        let transformer = self.build_transformer(definition)?;

        let destination = self.registry.destinations.create(
            &definition.destination.component_type,
            &definition.destination.config,
        )?;

        debug!(
            pipeline = name,
            source = source.component_type(),
            transformer = transformer.component_type(),
            destination = destination.component_type(),
            "Built pipeline"
        );

        Pipeline::builder()
            .source(source)
            .transformer(transformer)
            .destination(destination)
            .build()
    }

    fn build_transformer(
        &self,
        definition: &PipelineDefinitionConfig,
    ) -> Result<Arc<dyn Transformer>> {
        let mut steps = definition
            .transform
            .iter()
            .map(|step| {
                self.registry
                    .transformers
                    .create(&step.component_type, &step.config)
            })
            .collect::<Result<Vec<_>>>()?;

        match steps.len() {
            0 => Err(Error::MissingComponent("transformer")),
            1 => Ok(steps.remove(0)),
            _ => Ok(Arc::new(TransformChain::new(steps)?) as Arc<dyn Transformer>),
        }
    }
}
