//! Periodic background eviction.
//!
//! Lazy sweeping on read keeps `recall` correct on its own; the sweeper only
//! bounds memory for sessions nobody reads.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{MissedTickBehavior, interval};

use crate::clock::Clock;
use crate::error::{StmError, StmResult};
use crate::store::EntryStore;

/// Handle for a running sweep task
struct SweeperHandle {
    abort_handle: tokio::task::AbortHandle,
    every: Duration,
}

/// Owns at most one background sweep task over a store.
pub struct Sweeper {
    store: Arc<EntryStore>,
    clock: Arc<dyn Clock>,
    running: Mutex<Option<SweeperHandle>>,
}

impl Sweeper {
    pub fn new(store: Arc<EntryStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            running: Mutex::new(None),
        }
    }

    /// Spawn the sweep task on the current tokio runtime.
    ///
    /// Returns false if a task is already running.
    pub fn start(&self, every: Duration) -> StmResult<bool> {
        if every.is_zero() {
            return Err(StmError::invalid_input("sweep.interval", "must be greater than 0"));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            StmError::invalid_input("sweep", "the sweeper needs a running tokio runtime")
        })?;

        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(false);
        }

        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);

        let handle = runtime.spawn(async move {
            let mut ticks = interval(every);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticks.tick().await;
                let evicted = store.evict_expired(clock.now());
                tracing::trace!(evicted, "Sweep tick");
            }
        });

        tracing::info!(interval_ms = every.as_millis() as u64, "Started background sweeper");
        *running = Some(SweeperHandle {
            abort_handle: handle.abort_handle(),
            every,
        });
        Ok(true)
    }

    /// Stop the sweep task. Returns false if none was running.
    pub fn stop(&self) -> bool {
        match self.running.lock().take() {
            Some(handle) => {
                handle.abort_handle.abort();
                tracing::info!("Stopped background sweeper");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Interval of the running task.
    pub fn interval(&self) -> Option<Duration> {
        self.running.lock().as_ref().map(|h| h.every)
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.running.get_mut().take() {
            handle.abort_handle.abort();
        }
    }
}
