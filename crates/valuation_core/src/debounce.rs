//! Per-row debounce of field commits.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::future::BoxFuture;
use shared::domain::SrdId;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::debug;

/// Quiet period after the last edit before a row's fields are committed.
pub const COMMIT_QUIET_PERIOD: Duration = Duration::from_millis(600);

pub type CommitFn = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// At most one pending commit per row key: scheduling again supersedes the
/// pending one instead of queueing next to it.
#[async_trait]
pub trait CommitScheduler: Send + Sync {
    async fn schedule(&self, key: SrdId, commit: CommitFn);
    /// Returns whether a pending commit was dropped.
    async fn cancel(&self, key: SrdId) -> bool;
    async fn is_pending(&self, key: SrdId) -> bool;
    /// Drops every pending commit, returning how many there were.
    async fn cancel_all(&self) -> usize;
}

struct PendingTimer {
    id: u64,
    handle: JoinHandle<()>,
}

/// Tokio-timer backed scheduler. Tests drive it with a paused clock.
pub struct DebounceScheduler {
    quiet_period: Duration,
    timers: Arc<Mutex<HashMap<SrdId, PendingTimer>>>,
    next_timer_id: AtomicU64,
}

impl DebounceScheduler {
    pub fn new() -> Self {
        Self::with_quiet_period(COMMIT_QUIET_PERIOD)
    }

    pub fn with_quiet_period(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_timer_id: AtomicU64::new(1),
        }
    }
}

impl Default for DebounceScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommitScheduler for DebounceScheduler {
    async fn schedule(&self, key: SrdId, commit: CommitFn) {
        let id = self.next_timer_id.fetch_add(1, Ordering::Relaxed);
        let quiet_period = self.quiet_period;
        let timers = Arc::clone(&self.timers);

        // Held until the new entry is in place, so the timer task can never
        // observe the map before its own registration.
        let mut pending = self.timers.lock().await;
        if let Some(previous) = pending.remove(&key) {
            previous.handle.abort();
            debug!(srd_id = key.0, timer_id = previous.id, "debounce: superseded pending commit");
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            {
                let mut timers = timers.lock().await;
                match timers.get(&key) {
                    Some(timer) if timer.id == id => {
                        timers.remove(&key);
                    }
                    _ => return,
                }
            }
            debug!(srd_id = key.0, timer_id = id, "debounce: quiet period elapsed");
            // No longer registered, so nothing can abort the commit from here.
            commit().await;
        });
        pending.insert(key, PendingTimer { id, handle });
    }

    async fn cancel(&self, key: SrdId) -> bool {
        match self.timers.lock().await.remove(&key) {
            Some(timer) => {
                timer.handle.abort();
                debug!(srd_id = key.0, timer_id = timer.id, "debounce: cancelled pending commit");
                true
            }
            None => false,
        }
    }

    async fn is_pending(&self, key: SrdId) -> bool {
        self.timers.lock().await.contains_key(&key)
    }

    async fn cancel_all(&self) -> usize {
        let mut timers = self.timers.lock().await;
        let cancelled = timers.len();
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
        if cancelled > 0 {
            debug!(cancelled, "debounce: cancelled all pending commits");
        }
        cancelled
    }
}

#[cfg(test)]
#[path = "tests/debounce_tests.rs"]
mod tests;
