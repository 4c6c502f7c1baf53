//! Engine configuration.
//!
//! Process settings come from the environment ([`EngineConfig`]); pipeline
//! definitions come from a JSON file ([`PipelinesFile`]).

mod definitions;

pub use definitions::{
    ComponentSpec, PipelineDefinitionConfig, PipelinesFile, ScheduleSpec, TransformSpec,
};

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::scheduler::{OverlapPolicy, SchedulerConfig};

/// Default per-run timeout: 30 minutes.
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 30 * 60;

/// Process-level settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Path of the pipelines file.
    pub pipelines_path: PathBuf,
    /// Directory for log files.
    pub log_dir: PathBuf,
    /// Upper bound on a single pipeline run.
    pub run_timeout: Duration,
    /// What to do when a job fires while its previous run is still going.
    pub overlap_policy: OverlapPolicy,
    /// Log filter directive applied after logging starts, overriding `RUST_LOG`.
    pub log_filter: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pipelines_path: PathBuf::from("pipelines.json"),
            log_dir: PathBuf::from("logs"),
            run_timeout: Duration::from_secs(DEFAULT_RUN_TIMEOUT_SECS),
            overlap_policy: OverlapPolicy::default(),
            log_filter: None,
        }
    }
}

impl EngineConfig {
    /// Load settings from the environment, falling back to defaults.
    ///
    /// A `.env` file in the working directory is read first if present.
    ///
    /// Supported env vars:
    /// - `ETL_CONFIG` (pipelines file path)
    /// - `ETL_LOG_DIR`
    /// - `ETL_RUN_TIMEOUT_SECS`
    /// - `ETL_OVERLAP_POLICY` (`allow` or `skip`)
    /// - `ETL_LOG_FILTER` (e.g. `etl_engine=debug`)
    pub fn from_env_or_default() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("ETL_CONFIG")
            && !path.trim().is_empty()
        {
            config.pipelines_path = PathBuf::from(path);
        }

        if let Some(dir) = lookup("ETL_LOG_DIR")
            && !dir.trim().is_empty()
        {
            config.log_dir = PathBuf::from(dir);
        }

        if let Some(secs) = lookup("ETL_RUN_TIMEOUT_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.run_timeout = Duration::from_secs(secs),
                _ => warn!(value = %secs, "Ignoring invalid ETL_RUN_TIMEOUT_SECS"),
            }
        }

        if let Some(policy) = lookup("ETL_OVERLAP_POLICY") {
            match policy.parse::<OverlapPolicy>() {
                Ok(policy) => config.overlap_policy = policy,
                Err(e) => warn!(error = %e, "Ignoring invalid ETL_OVERLAP_POLICY"),
            }
        }

        if let Some(filter) = lookup("ETL_LOG_FILTER")
            && !filter.trim().is_empty()
        {
            config.log_filter = Some(filter.trim().to_string());
        }

        config
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            run_timeout: self.run_timeout,
            overlap_policy: self.overlap_policy,
        }
    }
}
