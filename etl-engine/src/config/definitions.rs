//! Pipeline definition file format.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::registry::ComponentConfig;
use crate::utils::json::expand_env_placeholders;
use crate::{Error, Result};

/// Top-level pipelines file: `{ "pipelines": { "<name>": { ... } } }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelinesFile {
    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineDefinitionConfig>,
}

/// One pipeline as written in the definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinitionConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub owner: String,
    pub source: ComponentSpec,
    /// Transform steps, applied in order.
    #[serde(default)]
    pub transform: Vec<TransformSpec>,
    pub destination: ComponentSpec,
    #[serde(default)]
    pub schedule: Vec<ScheduleSpec>,
}

/// A registered component type with its opaque configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSpec {
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default)]
    pub config: ComponentConfig,
}

/// One named transform step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformSpec {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default)]
    pub config: ComponentConfig,
}

/// One cron schedule for a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub name: String,
    pub cron: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-run timeout override in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl PipelinesFile {
    /// Read and parse a pipelines file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "failed to read pipelines file {}: {}",
                path.display(),
                e
            ))
        })?;
        let file: Self = contents.parse()?;
        debug!(
            path = %path.display(),
            pipelines = file.pipelines.len(),
            "Loaded pipelines file"
        );
        Ok(file)
    }

    /// Definition of the named pipeline.
    pub fn get(&self, name: &str) -> Option<&PipelineDefinitionConfig> {
        self.pipelines.get(name)
    }

    /// Pipeline names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.pipelines.keys().map(String::as_str).collect()
    }
}

impl FromStr for PipelinesFile {
    type Err = Error;

    /// Parse a pipelines document, expanding `${VAR}` placeholders in component
    /// configs from the environment. Definitions without a `name` take their key.
    fn from_str(s: &str) -> Result<Self> {
        let mut file: Self = serde_json::from_str(s)
            .map_err(|e| Error::config(format!("invalid pipelines file: {e}")))?;

        for (key, definition) in file.pipelines.iter_mut() {
            if definition.name.is_empty() {
                definition.name = key.clone();
            }
            expand_env_placeholders(&mut definition.source.config);
            expand_env_placeholders(&mut definition.destination.config);
            for step in &mut definition.transform {
                expand_env_placeholders(&mut step.config);
            }
        }

        Ok(file)
    }
}

impl ComponentSpec {
    pub fn new(component_type: impl Into<String>, config: Value) -> Self {
        Self {
            component_type: component_type.into(),
            config,
        }
    }
}
