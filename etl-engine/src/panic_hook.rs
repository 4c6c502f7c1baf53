use chrono::Local;
use std::{
    backtrace::Backtrace,
    fs::OpenOptions,
    io::Write,
    panic::{PanicHookInfo, take_hook},
    path::Path,
    thread,
};

use crate::logging::LOG_FILE_PREFIX;

/// Route process panics through `tracing` before the previous hook runs.
///
/// In `panic = "abort"` builds the record is also appended directly to the
/// current daily log file in `log_dir`, since the non-blocking writer may not
/// flush before the process aborts.
///
/// Panics inside scheduled pipeline runs still reach this hook; the scheduler
/// catches them afterwards through the task's join result.
pub fn install(log_dir: impl AsRef<Path>) {
    let log_dir = log_dir.as_ref().to_path_buf();
    let previous_hook = take_hook();

    std::panic::set_hook(Box::new(move |panic_info: &PanicHookInfo<'_>| {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let record = format_panic_record(panic_info);
            tracing::error!(target: "etl_engine::panic", "{record}");

            if cfg!(panic = "abort") {
                let _ = append_panic_record(&log_dir, &record);
            }
        }));

        previous_hook(panic_info);
    }));
}

fn append_panic_record(log_dir: &Path, record: &str) -> std::io::Result<()> {
    let filename = format!("{LOG_FILE_PREFIX}.{}", Local::now().format("%Y-%m-%d"));
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(filename))?;
    writeln!(file, "{record}")?;
    file.flush()
}

fn format_panic_record(panic_info: &PanicHookInfo<'_>) -> String {
    let payload = payload_text(panic_info);
    let location = panic_info
        .location()
        .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
        .unwrap_or_else(|| "<unknown>".to_string());
    let thread_name = thread::current()
        .name()
        .unwrap_or("<unnamed>")
        .to_string();

    format!(
        "{} PANIC thread={thread_name} location={location} payload={payload}\nBacktrace:\n{}",
        Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"),
        Backtrace::force_capture()
    )
}

fn payload_text(panic_info: &PanicHookInfo<'_>) -> String {
    let payload = panic_info.payload();
    payload
        .downcast_ref::<&'static str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| panic_info.to_string())
}
