//! Job configuration, state and run statistics.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::cron_expr::CronSchedule;
use super::timer::EntryId;
use crate::pipeline::Pipeline;
use crate::{Error, Result};

/// Caller-supplied job definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique job name within a scheduler.
    pub name: String,
    /// Cron expression.
    pub schedule: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-run timeout override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl JobConfig {
    pub fn new(name: impl Into<String>, schedule: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schedule: schedule.into(),
            enabled: true,
            timeout_secs: None,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs().max(1));
        self
    }
}

/// Behavior when a job fires while its previous run is still in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Start another run concurrently.
    #[default]
    Allow,
    /// Skip the firing.
    Skip,
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

impl FromStr for OverlapPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "skip" => Ok(Self::Skip),
            other => Err(Error::config(format!("unknown overlap policy: {other}"))),
        }
    }
}

/// Counters for one job's runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    /// Runs started.
    pub runs: u64,
    pub successes: u64,
    /// Runs that returned an error, including timeouts and cancellations.
    pub failures: u64,
    /// Runs that panicked.
    pub panics: u64,
    /// Firings skipped because the previous run was still going.
    pub skipped: u64,
    pub last_started: Option<DateTime<Local>>,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
}

/// Outcome of a single run, as recorded in [`JobStats`].
#[derive(Debug)]
pub(crate) enum RunOutcome {
    Success,
    Failed(String),
    Panicked(String),
}

/// Runtime state shared by a job's firings.
#[derive(Default)]
pub(crate) struct JobRuntime {
    in_flight: AtomicUsize,
    stats: Mutex<JobStats>,
}

impl JobRuntime {
    /// Start a run only if none is in flight.
    pub(crate) fn try_begin(&self) -> bool {
        self.in_flight
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn begin(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) > 0
    }

    pub(crate) fn record_start(&self, at: DateTime<Local>) {
        let mut stats = self.stats.lock();
        stats.runs += 1;
        stats.last_started = Some(at);
    }

    pub(crate) fn record_skip(&self) {
        self.stats.lock().skipped += 1;
    }

    pub(crate) fn record_finish(&self, outcome: RunOutcome, elapsed: Duration) {
        {
            let mut stats = self.stats.lock();
            stats.last_duration_ms = Some(elapsed.as_millis() as u64);
            match outcome {
                RunOutcome::Success => {
                    stats.successes += 1;
                    stats.last_error = None;
                }
                RunOutcome::Failed(error) => {
                    stats.failures += 1;
                    stats.last_error = Some(error);
                }
                RunOutcome::Panicked(message) => {
                    stats.panics += 1;
                    stats.last_error = Some(format!("panicked: {message}"));
                }
            }
        }
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn stats(&self) -> JobStats {
        self.stats.lock().clone()
    }
}

/// A registered job: its configuration, pipeline and timer registration.
pub(crate) struct Job {
    pub(crate) config: JobConfig,
    pub(crate) schedule: CronSchedule,
    pub(crate) pipeline: Arc<Pipeline>,
    /// Present while the job is enabled.
    pub(crate) entry: Option<EntryId>,
    pub(crate) runtime: Arc<JobRuntime>,
}

impl Job {
    pub(crate) fn new(config: JobConfig, pipeline: Arc<Pipeline>) -> Result<Self> {
        if config.name.trim().is_empty() {
            return Err(Error::config("job name cannot be empty"));
        }
        let schedule = CronSchedule::parse(&config.schedule)?;
        Ok(Self {
            config,
            schedule,
            pipeline,
            entry: None,
            runtime: Arc::new(JobRuntime::default()),
        })
    }

    pub(crate) fn timeout(&self, default: Duration) -> Duration {
        self.config
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(default)
    }
}
