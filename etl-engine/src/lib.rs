//! Pluggable extract-transform-load engine.
//!
//! A [`Pipeline`](pipeline::Pipeline) binds one data source, one transformer
//! and one destination. Pipelines are assembled from JSON definitions through
//! a [`ComponentRegistry`](registry::ComponentRegistry) and run on cron
//! schedules by the [`Scheduler`](scheduler::Scheduler).

pub mod config;
pub mod error;
pub mod logging;
pub mod panic_hook;
pub mod pipeline;
pub mod registry;
pub mod scheduler;
pub mod utils;

pub use error::{Error, Result};
