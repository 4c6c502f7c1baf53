//! Cron-driven pipeline scheduler.
//!
//! The scheduler owns a map of named jobs and one [`CronTimer`]. Each firing
//! runs the job's pipeline on its own task under a child of the scheduler's
//! root context, bounded by the run timeout. A panicking run is logged and
//! counted; the job keeps its schedule.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::Local;
use parking_lot::{Mutex, RwLock};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::job::{Job, JobConfig, JobRuntime, JobStats, OverlapPolicy, RunOutcome};
use super::timer::{CronTimer, FireCallback};
use crate::config::DEFAULT_RUN_TIMEOUT_SECS;
use crate::pipeline::{ExecutionContext, Pipeline};
use crate::{Error, Result};

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Upper bound on one pipeline run.
    pub run_timeout: Duration,
    /// Behavior when a job fires while its previous run is in flight.
    pub overlap_policy: OverlapPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_timeout: Duration::from_secs(DEFAULT_RUN_TIMEOUT_SECS),
            overlap_policy: OverlapPolicy::Allow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

struct SchedulerInner {
    config: SchedulerConfig,
    jobs: RwLock<HashMap<String, Job>>,
    timer: CronTimer,
    root: ExecutionContext,
    tasks: TaskTracker,
    lifecycle: Mutex<Lifecycle>,
}

/// Why a firing was requested.
#[derive(Debug, Clone, Copy)]
enum Trigger {
    Schedule,
    Manual,
}

/// Runs pipelines on cron schedules.
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                jobs: RwLock::new(HashMap::new()),
                timer: CronTimer::new(),
                root: ExecutionContext::new(),
                tasks: TaskTracker::new(),
                lifecycle: Mutex::new(Lifecycle::Idle),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Register a job. Enabled jobs are scheduled immediately.
    ///
    /// Fails with [`Error::DuplicateJob`] when the name is taken; the existing
    /// job is left untouched.
    pub fn add_job(&self, config: JobConfig, pipeline: Pipeline) -> Result<()> {
        let mut jobs = self.inner.jobs.write();
        if jobs.contains_key(&config.name) {
            return Err(Error::DuplicateJob(config.name));
        }

        let mut job = Job::new(config, Arc::new(pipeline))?;
        if job.config.enabled {
            self.install(&mut job);
        }

        info!(
            job = %job.config.name,
            schedule = %job.config.schedule,
            enabled = job.config.enabled,
            "Job added"
        );
        jobs.insert(job.config.name.clone(), job);
        Ok(())
    }

    /// Unschedule and forget a job. Runs already in flight continue.
    pub fn remove_job(&self, name: &str) -> Result<()> {
        let job = self
            .inner
            .jobs
            .write()
            .remove(name)
            .ok_or_else(|| Error::JobNotFound(name.to_string()))?;
        if let Some(entry) = job.entry {
            self.inner.timer.remove(entry);
        }
        info!(job = name, "Job removed");
        Ok(())
    }

    /// Schedule a job. No-op when it is already enabled.
    pub fn enable_job(&self, name: &str) -> Result<()> {
        let mut jobs = self.inner.jobs.write();
        let job = jobs
            .get_mut(name)
            .ok_or_else(|| Error::JobNotFound(name.to_string()))?;
        if job.entry.is_some() {
            return Ok(());
        }
        self.install(job);
        job.config.enabled = true;
        info!(job = name, "Job enabled");
        Ok(())
    }

    /// Unschedule a job but keep it registered. No-op when already disabled.
    pub fn disable_job(&self, name: &str) -> Result<()> {
        let mut jobs = self.inner.jobs.write();
        let job = jobs
            .get_mut(name)
            .ok_or_else(|| Error::JobNotFound(name.to_string()))?;
        if let Some(entry) = job.entry.take() {
            self.inner.timer.remove(entry);
            info!(job = name, "Job disabled");
        }
        job.config.enabled = false;
        Ok(())
    }

    /// Start the timer loop. Must be called within a Tokio runtime.
    pub fn start(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Idle => {
                self.inner.timer.start();
                *lifecycle = Lifecycle::Running;
                info!(jobs = self.inner.jobs.read().len(), "Scheduler started");
            }
            Lifecycle::Running => debug!("Scheduler already running"),
            Lifecycle::Stopped => warn!("Scheduler was stopped and cannot be restarted"),
        }
    }

    /// Cancel every in-flight run and halt the timer loop.
    ///
    /// Runs whose components honor cancellation end with
    /// [`Error::Cancelled`]. The scheduler cannot be started again.
    pub fn stop(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        if *lifecycle == Lifecycle::Stopped {
            return;
        }
        *lifecycle = Lifecycle::Stopped;
        self.inner.root.cancel();
        self.inner.timer.stop();
        self.inner.tasks.close();
        info!("Scheduler stopped");
    }

    /// [`stop`](Self::stop), then wait for the timer loop and in-flight runs
    /// to finish.
    pub async fn shutdown(&self) {
        self.stop();
        self.inner.timer.shutdown().await;
        self.inner.tasks.wait().await;
    }

    pub fn is_running(&self) -> bool {
        *self.inner.lifecycle.lock() == Lifecycle::Running
    }

    /// Snapshot of every job's configuration.
    pub fn get_jobs(&self) -> BTreeMap<String, JobConfig> {
        self.inner
            .jobs
            .read()
            .iter()
            .map(|(name, job)| (name.clone(), job.config.clone()))
            .collect()
    }

    pub fn job_stats(&self, name: &str) -> Result<JobStats> {
        self.inner
            .jobs
            .read()
            .get(name)
            .map(|job| job.runtime.stats())
            .ok_or_else(|| Error::JobNotFound(name.to_string()))
    }

    /// Whether a run of the job is currently in flight.
    pub fn is_job_running(&self, name: &str) -> Result<bool> {
        self.inner
            .jobs
            .read()
            .get(name)
            .map(|job| job.runtime.is_running())
            .ok_or_else(|| Error::JobNotFound(name.to_string()))
    }

    /// Run a job now, outside its schedule.
    ///
    /// The run goes through the same path as a scheduled firing, including
    /// the overlap policy. Works for disabled jobs and before `start`.
    pub fn trigger(&self, name: &str) -> Result<()> {
        if *self.inner.lifecycle.lock() == Lifecycle::Stopped {
            return Err(Error::Cancelled);
        }
        if !self.inner.jobs.read().contains_key(name) {
            return Err(Error::JobNotFound(name.to_string()));
        }
        SchedulerInner::fire(&self.inner, name, Trigger::Manual);
        Ok(())
    }

    fn install(&self, job: &mut Job) {
        let weak: Weak<SchedulerInner> = Arc::downgrade(&self.inner);
        let name = job.config.name.clone();
        let callback: FireCallback = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                SchedulerInner::fire(&inner, &name, Trigger::Schedule);
            }
        });
        job.entry = Some(self.inner.timer.add(job.schedule.clone(), callback));
    }
}

impl SchedulerInner {
    /// Dispatch one run of `name` onto its own task.
    fn fire(inner: &Arc<Self>, name: &str, trigger: Trigger) {
        let (pipeline, runtime, timeout) = {
            let jobs = inner.jobs.read();
            let Some(job) = jobs.get(name) else {
                debug!(job = name, "Fired job no longer exists");
                return;
            };
            (
                job.pipeline.clone(),
                job.runtime.clone(),
                job.timeout(inner.config.run_timeout),
            )
        };

        if inner.root.is_cancelled() {
            return;
        }

        match inner.config.overlap_policy {
            OverlapPolicy::Allow => runtime.begin(),
            OverlapPolicy::Skip => {
                if !runtime.try_begin() {
                    runtime.record_skip();
                    warn!(job = name, "Previous run still in flight; skipping firing");
                    return;
                }
            }
        }

        let ctx = inner.root.with_timeout(timeout);
        let name = name.to_string();
        inner
            .tasks
            .spawn(run_job(name, pipeline, runtime, ctx, trigger));
    }
}

async fn run_job(
    name: String,
    pipeline: Arc<Pipeline>,
    runtime: Arc<JobRuntime>,
    ctx: ExecutionContext,
    trigger: Trigger,
) {
    let started = Instant::now();
    runtime.record_start(Local::now());
    info!(job = %name, trigger = ?trigger, "Job run started");

    let execution = tokio::spawn({
        let ctx = ctx.clone();
        async move { pipeline.execute(&ctx).await }
    });

    let outcome = match execution.await {
        Ok(Ok(())) => {
            info!(
                job = %name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Job run succeeded"
            );
            RunOutcome::Success
        }
        Ok(Err(e)) => {
            if e.is_cancelled() {
                warn!(job = %name, "Job run cancelled");
            } else {
                error!(
                    job = %name,
                    stage = ?e.stage(),
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job run failed"
                );
            }
            RunOutcome::Failed(e.to_string())
        }
        Err(join_error) if join_error.is_panic() => {
            let message = panic_message(join_error.into_panic());
            error!(job = %name, panic = %message, "Job run panicked");
            RunOutcome::Panicked(message)
        }
        Err(join_error) => {
            warn!(job = %name, error = %join_error, "Job run aborted");
            RunOutcome::Failed(join_error.to_string())
        }
    };

    // Release the child token.
    ctx.cancel();
    runtime.record_finish(outcome, started.elapsed());
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
