//! Per-record flush timers.
//!
//! Every record gets its own timer, so arming one key never resets
//! another. A timer runs its callback only after removing its own entry
//! from the table. Cancelling and re-arming abort handles that are still in
//! the table, so a callback that has started is never aborted, and a timer
//! that wakes up after being replaced exits without running.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mealsync_core::RecordRef;
use tokio::task::JoinHandle;
use tracing::trace;

#[derive(Debug)]
struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
pub struct FlushScheduler {
    timers: DashMap<String, ArmedTimer>,
    next_generation: AtomicU64,
}

impl FlushScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Arm (or re-arm) the timer for `record`.
    ///
    /// After `delay`, the timer disarms itself and runs `fire`. A timer that
    /// was already armed for the record is aborted.
    pub fn arm<F, Fut>(self: &Arc<Self>, record: &RecordRef, delay: Duration, fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cache_key = record.cache_key();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let scheduler: Weak<Self> = Arc::downgrade(self);
        let timer_key = cache_key.clone();

        // Holding the entry keeps the task from disarming before it is
        // registered.
        let entry = self.timers.entry(cache_key);
        let handle = tokio::spawn(Self::expire(scheduler, timer_key, generation, delay, fire));
        let timer = ArmedTimer { generation, handle };

        match entry {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(timer);
                previous.handle.abort();
                trace!(record = %record, ?delay, "Re-armed flush timer");
            }
            Entry::Vacant(vacant) => {
                vacant.insert(timer);
                trace!(record = %record, ?delay, "Armed flush timer");
            }
        }
    }

    async fn expire<F, Fut>(
        scheduler: Weak<Self>,
        cache_key: String,
        generation: u64,
        delay: Duration,
        fire: F,
    ) where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        tokio::time::sleep(delay).await;
        let disarmed = scheduler
            .upgrade()
            .is_some_and(|scheduler| scheduler.disarm(&cache_key, generation));
        if !disarmed {
            trace!(cache_key = %cache_key, generation, "Superseded flush timer exiting");
            return;
        }
        fire().await;
    }

    /// Remove the entry if it still belongs to `generation`.
    fn disarm(&self, cache_key: &str, generation: u64) -> bool {
        self.timers
            .remove_if(cache_key, |_, timer| timer.generation == generation)
            .is_some()
    }

    /// Cancel the armed timer for `record`. Returns whether one was armed.
    pub fn cancel(&self, record: &RecordRef) -> bool {
        match self.timers.remove(&record.cache_key()) {
            Some((_, timer)) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let keys: Vec<String> = self.timers.iter().map(|e| e.key().clone()).collect();
        let mut cancelled = 0;
        for key in keys {
            if let Some((_, timer)) = self.timers.remove(&key) {
                timer.handle.abort();
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn is_armed(&self, record: &RecordRef) -> bool {
        self.timers.contains_key(&record.cache_key())
    }

    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        for entry in self.timers.iter() {
            entry.handle.abort();
        }
    }
}
