mod cli;

use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use etl_engine::config::{EngineConfig, PipelinesFile};
use etl_engine::pipeline::{ExecutionContext, PipelineLoader};
use etl_engine::registry::ComponentRegistry;
use etl_engine::scheduler::Scheduler;
use etl_engine::{logging, panic_hook};

use crate::cli::{Args, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = EngineConfig::from_env_or_default();
    if let Some(path) = args.config {
        config.pipelines_path = path;
    }
    if let Some(dir) = args.log_dir {
        config.log_dir = dir;
    }
    if let Some(filter) = args.log_filter {
        config.log_filter = Some(filter);
    }

    let (logging, _guard) = logging::init_logging(&config.log_dir)?;
    if let Some(directive) = &config.log_filter {
        logging.set_filter(directive)?;
    }
    info!(
        log_dir = %logging.log_dir().display(),
        filter = %logging.get_filter(),
        "Logging initialized"
    );
    panic_hook::install(&config.log_dir);

    let shutdown = CancellationToken::new();
    logging.start_retention_cleanup(shutdown.clone());

    let definitions = PipelinesFile::from_path(&config.pipelines_path).with_context(|| {
        format!(
            "loading pipelines from {}",
            config.pipelines_path.display()
        )
    })?;
    let registry = Arc::new(ComponentRegistry::with_defaults()?);
    let loader = PipelineLoader::new(registry, definitions);

    let result = match args.command {
        Commands::Run => run(&loader, &config).await,
        Commands::Exec { pipeline } => exec(&loader, &config, &pipeline).await,
        Commands::List => list(&loader),
    };

    shutdown.cancel();
    result
}

async fn run(loader: &PipelineLoader, config: &EngineConfig) -> anyhow::Result<()> {
    let pipelines = loader.load_all()?;
    let scheduler = Scheduler::new(config.scheduler_config());

    for (name, pipeline) in &pipelines {
        let jobs = loader.job_configs(name)?;
        if jobs.is_empty() {
            warn!(pipeline = %name, "Pipeline has no schedule entries");
        }
        for job in jobs {
            scheduler.add_job(job, pipeline.clone())?;
        }
    }

    scheduler.start();
    info!(
        jobs = scheduler.get_jobs().len(),
        pipelines = pipelines.len(),
        "Scheduler running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown signal received");
    scheduler.shutdown().await;
    Ok(())
}

async fn exec(loader: &PipelineLoader, config: &EngineConfig, name: &str) -> anyhow::Result<()> {
    let pipeline = loader.load(name)?;
    let ctx = ExecutionContext::new().with_timeout(config.run_timeout);

    let interrupt = ctx.clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling run");
            interrupt.cancel();
        }
    });

    let result = pipeline.execute(&ctx).await;
    signal.abort();

    match result {
        Ok(()) => {
            info!(pipeline = name, "Pipeline run succeeded");
            Ok(())
        }
        Err(e) => {
            error!(pipeline = name, error = %e, "Pipeline run failed");
            bail!("pipeline '{name}' failed: {e}")
        }
    }
}

fn list(loader: &PipelineLoader) -> anyhow::Result<()> {
    let mut listing = Vec::new();
    for (name, definition) in &loader.definitions().pipelines {
        let components = match loader.load(name) {
            Ok(pipeline) => serde_json::to_value(pipeline.get_components())?,
            Err(e) => json!({ "error": e.to_string() }),
        };
        listing.push(json!({
            "name": name,
            "description": definition.description,
            "version": definition.version,
            "owner": definition.owner,
            "components": components,
            "schedule": loader.job_configs(name)?,
        }));
    }
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}
