//! Cron scheduling of pipelines.

mod cron_expr;
mod job;
mod service;
mod timer;

pub use cron_expr::CronSchedule;
pub use job::{JobConfig, JobStats, OverlapPolicy};
pub use service::{Scheduler, SchedulerConfig};
pub use timer::{CronTimer, EntryId, FireCallback};
