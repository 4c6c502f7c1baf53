use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Run extract-transform-load pipelines on cron schedules.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Pipelines definition file (JSON)
    #[arg(short, long, global = true, env = "ETL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for log files
    #[arg(long, global = true, env = "ETL_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log filter directive, e.g. `etl_engine=debug`
    #[arg(long, global = true, env = "ETL_LOG_FILTER")]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Schedule every pipeline and run until interrupted
    Run,

    /// Execute one pipeline once and exit
    Exec {
        /// Pipeline name
        pipeline: String,
    },

    /// Print pipelines, their components and schedules as JSON
    List,
}
