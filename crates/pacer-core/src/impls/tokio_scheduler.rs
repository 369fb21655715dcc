//! TokioScheduler - scheduler backed by the tokio timer.
//!
//! # Implementation
//! - one spawned task per timer: `sleep(delay)` then run the callback
//! - armed timers live in `HashMap<u64, AbortHandle>`; the task removes its own entry
//!   before running, so a timer cancelled just as it wakes never runs
//! - `now()` reads `tokio::time::Instant`, so a paused test runtime drives both the
//!   timers and the clock

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::guard::lock;
use crate::ports::{Clock, Scheduler, TimerHandle, TimerTask};

pub struct TokioScheduler {
    handle: Handle,
    next_id: AtomicU64,
    timers: Arc<Mutex<HashMap<u64, AbortHandle>>>,
}

impl TokioScheduler {
    /// Scheduler on the runtime of the calling context.
    ///
    /// # Panics
    /// Panics when called outside of a tokio runtime, like `tokio::spawn`.
    pub fn current() -> Self {
        Self::with_handle(Handle::current())
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(1),
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of armed timers.
    pub fn pending(&self) -> usize {
        lock(&self.timers).len()
    }
}

impl Clock for TokioScheduler {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);

        // Held across spawn so the timer cannot look itself up before it is registered.
        let mut armed = lock(&self.timers);
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let still_armed = lock(&timers).remove(&id).is_some();
            if still_armed {
                task();
            }
        });
        armed.insert(id, join.abort_handle());

        TimerHandle::from_raw(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some(abort) = lock(&self.timers).remove(&handle.as_raw()) {
            abort.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, abort) in lock(&self.timers).drain() {
            abort.abort();
        }
    }
}
