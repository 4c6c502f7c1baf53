//! Scheduler behavior with stub pipeline components.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use etl_engine::pipeline::{
    ConfigMap, DataSource, Destination, ExecutionContext, Pipeline, Transformer,
};
use etl_engine::scheduler::{JobConfig, OverlapPolicy, Scheduler, SchedulerConfig};
use etl_engine::{Error, Result};

/// Source whose fetch waits until its context ends.
#[derive(Default)]
struct BlockingSource {
    started: AtomicBool,
    observed_cancel: AtomicBool,
}

#[async_trait]
impl DataSource for BlockingSource {
    fn component_type(&self) -> &'static str {
        "blocking"
    }

    async fn fetch(&self, ctx: &ExecutionContext) -> Result<Vec<u8>> {
        self.started.store(true, Ordering::SeqCst);
        let result = ctx.run(std::future::pending::<Result<Vec<u8>>>()).await;
        if ctx.token().is_cancelled() {
            self.observed_cancel.store(true, Ordering::SeqCst);
        }
        result
    }

    fn source_config(&self) -> ConfigMap {
        ConfigMap::new()
    }
}

/// Source that panics on its first fetch and succeeds afterwards.
#[derive(Default)]
struct PanicOnceSource {
    calls: AtomicUsize,
}

#[async_trait]
impl DataSource for PanicOnceSource {
    fn component_type(&self) -> &'static str {
        "panic_once"
    }

    async fn fetch(&self, _ctx: &ExecutionContext) -> Result<Vec<u8>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("upstream returned garbage");
        }
        Ok(b"{}".to_vec())
    }

    fn source_config(&self) -> ConfigMap {
        ConfigMap::new()
    }
}

#[derive(Default)]
struct CountingSource {
    calls: AtomicUsize,
}

#[async_trait]
impl DataSource for CountingSource {
    fn component_type(&self) -> &'static str {
        "counting"
    }

    async fn fetch(&self, _ctx: &ExecutionContext) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(b"{}".to_vec())
    }

    fn source_config(&self) -> ConfigMap {
        ConfigMap::new()
    }
}

struct Passthrough;

impl Transformer for Passthrough {
    fn component_type(&self) -> &'static str {
        "passthrough"
    }

    fn transform(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn transform_config(&self) -> ConfigMap {
        ConfigMap::new()
    }
}

struct Rejecting;

impl Transformer for Rejecting {
    fn component_type(&self) -> &'static str {
        "rejecting"
    }

    fn transform(&self, _data: &[u8]) -> Result<Vec<u8>> {
        Err(Error::transform("schema mismatch"))
    }

    fn transform_config(&self) -> ConfigMap {
        ConfigMap::new()
    }
}

#[derive(Default)]
struct SpyDestination {
    calls: AtomicUsize,
}

#[async_trait]
impl Destination for SpyDestination {
    fn component_type(&self) -> &'static str {
        "spy"
    }

    async fn store(&self, _ctx: &ExecutionContext, _data: &[u8]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn dest_config(&self) -> ConfigMap {
        ConfigMap::new()
    }
}

/// A job that never fires on its own during a test.
fn manual_job(name: &str) -> JobConfig {
    JobConfig::new(name, "0 0 1 1 *").disabled()
}

async fn wait_for(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met within 5s");
}

#[tokio::test]
async fn store_is_skipped_when_transform_fails() {
    let spy = Arc::new(SpyDestination::default());
    let scheduler = Scheduler::default();
    scheduler
        .add_job(
            manual_job("rejecting"),
            Pipeline::new(
                Arc::new(CountingSource::default()),
                Arc::new(Rejecting),
                spy.clone(),
            ),
        )
        .unwrap();

    scheduler.trigger("rejecting").unwrap();
    wait_for(|| !scheduler.is_job_running("rejecting").unwrap()).await;

    let stats = scheduler.job_stats("rejecting").unwrap();
    assert_eq!(stats.failures, 1);
    assert!(stats.last_error.unwrap().starts_with("transform stage failed"));
    assert_eq!(spy.calls.load(Ordering::SeqCst), 0);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn duplicate_job_leaves_first_untouched() {
    let scheduler = Scheduler::default();
    let pipeline = Pipeline::new(
        Arc::new(CountingSource::default()),
        Arc::new(Passthrough),
        Arc::new(SpyDestination::default()),
    );

    scheduler
        .add_job(JobConfig::new("sync", "*/5 * * * *"), pipeline.clone())
        .unwrap();
    let err = scheduler
        .add_job(JobConfig::new("sync", "@hourly").disabled(), pipeline)
        .unwrap_err();

    assert!(matches!(err, Error::DuplicateJob(ref name) if name == "sync"));
    let jobs = scheduler.get_jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs["sync"].schedule, "*/5 * * * *");
    assert!(jobs["sync"].enabled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_cancels_running_execution() {
    let source = Arc::new(BlockingSource::default());
    let scheduler = Scheduler::default();
    scheduler
        .add_job(
            manual_job("long"),
            Pipeline::new(
                source.clone(),
                Arc::new(Passthrough),
                Arc::new(SpyDestination::default()),
            ),
        )
        .unwrap();
    scheduler.start();

    scheduler.trigger("long").unwrap();
    wait_for(|| source.started.load(Ordering::SeqCst)).await;
    assert!(scheduler.is_job_running("long").unwrap());

    scheduler.stop();
    wait_for(|| source.observed_cancel.load(Ordering::SeqCst)).await;
    scheduler.shutdown().await;

    let stats = scheduler.job_stats("long").unwrap();
    assert_eq!(stats.failures, 1);
    assert!(stats.last_error.unwrap().contains("cancelled"));
    assert!(!scheduler.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_run_does_not_disable_job() {
    let source = Arc::new(PanicOnceSource::default());
    let spy = Arc::new(SpyDestination::default());
    let scheduler = Scheduler::default();
    scheduler
        .add_job(
            JobConfig::new("flaky", "0 0 1 1 *"),
            Pipeline::new(source.clone(), Arc::new(Passthrough), spy.clone()),
        )
        .unwrap();

    scheduler.trigger("flaky").unwrap();
    wait_for(|| scheduler.job_stats("flaky").unwrap().panics == 1).await;
    wait_for(|| !scheduler.is_job_running("flaky").unwrap()).await;

    let stats = scheduler.job_stats("flaky").unwrap();
    assert!(stats.last_error.unwrap().contains("upstream returned garbage"));
    assert!(scheduler.get_jobs()["flaky"].enabled);

    scheduler.trigger("flaky").unwrap();
    wait_for(|| spy.calls.load(Ordering::SeqCst) == 1).await;
    wait_for(|| !scheduler.is_job_running("flaky").unwrap()).await;

    let stats = scheduler.job_stats("flaky").unwrap();
    assert_eq!(stats.runs, 2);
    assert_eq!(stats.successes, 1);
    assert_eq!(stats.last_error, None);
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_timeout_bounds_execution() {
    let scheduler = Scheduler::new(SchedulerConfig {
        run_timeout: Duration::from_millis(100),
        ..Default::default()
    });
    scheduler
        .add_job(
            manual_job("slow"),
            Pipeline::new(
                Arc::new(BlockingSource::default()),
                Arc::new(Passthrough),
                Arc::new(SpyDestination::default()),
            ),
        )
        .unwrap();

    scheduler.trigger("slow").unwrap();
    wait_for(|| scheduler.job_stats("slow").unwrap().failures == 1).await;

    let stats = scheduler.job_stats("slow").unwrap();
    assert!(stats.last_error.unwrap().contains("timed out"));
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn per_job_timeout_overrides_default() {
    let scheduler = Scheduler::default();
    scheduler
        .add_job(
            manual_job("slow").with_timeout(Duration::from_secs(1)),
            Pipeline::new(
                Arc::new(BlockingSource::default()),
                Arc::new(Passthrough),
                Arc::new(SpyDestination::default()),
            ),
        )
        .unwrap();

    scheduler.trigger("slow").unwrap();
    wait_for(|| scheduler.job_stats("slow").unwrap().failures == 1).await;

    let stats = scheduler.job_stats("slow").unwrap();
    assert!(stats.last_error.unwrap().ends_with("timed out after 1s"));
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn skip_policy_drops_overlapping_firing() {
    let source = Arc::new(BlockingSource::default());
    let scheduler = Scheduler::new(SchedulerConfig {
        overlap_policy: OverlapPolicy::Skip,
        ..Default::default()
    });
    scheduler
        .add_job(
            manual_job("exclusive"),
            Pipeline::new(
                source.clone(),
                Arc::new(Passthrough),
                Arc::new(SpyDestination::default()),
            ),
        )
        .unwrap();

    scheduler.trigger("exclusive").unwrap();
    wait_for(|| source.started.load(Ordering::SeqCst)).await;
    scheduler.trigger("exclusive").unwrap();

    let stats = scheduler.job_stats("exclusive").unwrap();
    assert_eq!(stats.runs, 1);
    assert_eq!(stats.skipped, 1);
    scheduler.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn enabled_job_fires_on_schedule() {
    let source = Arc::new(CountingSource::default());
    let spy = Arc::new(SpyDestination::default());
    let scheduler = Scheduler::default();
    scheduler
        .add_job(
            JobConfig::new("every_second", "* * * * * *"),
            Pipeline::new(source.clone(), Arc::new(Passthrough), spy.clone()),
        )
        .unwrap();
    scheduler.start();

    wait_for(|| spy.calls.load(Ordering::SeqCst) >= 1).await;
    scheduler.disable_job("every_second").unwrap();
    scheduler.shutdown().await;

    assert!(source.calls.load(Ordering::SeqCst) >= 1);
    assert!(scheduler.job_stats("every_second").unwrap().successes >= 1);
}
