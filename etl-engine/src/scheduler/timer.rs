//! Single background loop that fires cron entries.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::cron_expr::CronSchedule;

/// Handle of one timer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId(u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Invoked on the timer task each time an entry fires. Must not block.
pub type FireCallback = Arc<dyn Fn() + Send + Sync>;

struct Entry {
    schedule: CronSchedule,
    next: Option<DateTime<Local>>,
    callback: FireCallback,
}

#[derive(Default)]
struct TimerShared {
    entries: Mutex<BTreeMap<EntryId, Entry>>,
    wake: Notify,
}

/// Sleeps until the earliest registered firing, then runs every due callback.
///
/// Adding or removing an entry wakes the loop so it recomputes its deadline.
/// Firings missed while the loop was busy are not replayed; each entry simply
/// moves on to its next time after "now".
pub struct CronTimer {
    shared: Arc<TimerShared>,
    next_id: AtomicU64,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Default for CronTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl CronTimer {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(TimerShared::default()),
            next_id: AtomicU64::new(1),
            token: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    /// Register `callback` to run on every firing of `schedule`.
    pub fn add(&self, schedule: CronSchedule, callback: FireCallback) -> EntryId {
        let id = EntryId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let next = schedule.next_after(&Local::now());
        debug!(entry = %id, expression = schedule.expression(), next = ?next, "Timer entry added");
        self.shared.entries.lock().insert(
            id,
            Entry {
                schedule,
                next,
                callback,
            },
        );
        self.shared.wake.notify_one();
        id
    }

    /// Remove an entry; returns whether it existed.
    pub fn remove(&self, id: EntryId) -> bool {
        let removed = self.shared.entries.lock().remove(&id).is_some();
        if removed {
            self.shared.wake.notify_one();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next firing time of an entry.
    pub fn next_fire(&self, id: EntryId) -> Option<DateTime<Local>> {
        self.shared.entries.lock().get(&id).and_then(|e| e.next)
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Spawn the timer loop. Must be called within a Tokio runtime.
    ///
    /// Does nothing if the loop is already running or the timer was stopped.
    pub fn start(&self) {
        let mut handle = self.handle.lock();
        if handle.is_some() || self.token.is_cancelled() {
            return;
        }

        let shared = self.shared.clone();
        let token = self.token.clone();
        *handle = Some(tokio::spawn(run_loop(shared, token)));
    }

    /// Stop the timer loop. A stopped timer cannot be restarted.
    pub fn stop(&self) {
        self.token.cancel();
        self.shared.wake.notify_one();
    }

    /// Stop the loop and wait for it to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Timer loop ended abnormally");
        }
    }
}

impl Drop for CronTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run_loop(shared: Arc<TimerShared>, token: CancellationToken) {
    debug!("Timer loop started");
    loop {
        let now = Local::now();
        let mut due = Vec::new();
        let mut earliest: Option<DateTime<Local>> = None;

        {
            let mut entries = shared.entries.lock();
            for (id, entry) in entries.iter_mut() {
                if let Some(next) = entry.next
                    && next <= now
                {
                    trace!(entry = %id, "Timer entry due");
                    due.push(entry.callback.clone());
                    entry.next = entry.schedule.next_after(&now);
                }
                if let Some(next) = entry.next {
                    earliest = Some(earliest.map_or(next, |e| e.min(next)));
                }
            }
        }

        for callback in due {
            callback();
        }

        let sleep_for = earliest.map(|at| {
            (at - Local::now())
                .to_std()
                .unwrap_or(Duration::ZERO)
        });

        match sleep_for {
            Some(duration) => {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = shared.wake.notified() => {}
                    _ = tokio::time::sleep(duration) => {}
                }
            }
            None => {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = shared.wake.notified() => {}
                }
            }
        }
    }
    debug!("Timer loop stopped");
}
