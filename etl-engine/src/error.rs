//! Engine-wide error types.

use std::time::Duration;

use thiserror::Error;

use crate::pipeline::Stage;
use crate::registry::RegistryError;

/// Engine-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Unknown {kind} type: {name}")]
    UnknownComponent { kind: &'static str, name: String },

    #[error("Pipeline is missing its {0} component")]
    MissingComponent(&'static str),

    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("Job already exists: {0}")]
    DuplicateJob(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Pagination error: {0}")]
    Pagination(String),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }

    pub fn pagination(msg: impl Into<String>) -> Self {
        Self::Pagination(msg.into())
    }

    pub fn unknown_component(kind: &'static str, name: impl Into<String>) -> Self {
        Self::UnknownComponent {
            kind,
            name: name.into(),
        }
    }

    pub fn invalid_cron(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCron {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn at_stage(stage: Stage, source: Error) -> Self {
        Self::Stage {
            stage,
            source: Box::new(source),
        }
    }

    /// Whether this error (or the stage failure it wraps) came from cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Stage { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// The stage a pipeline run failed in, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
