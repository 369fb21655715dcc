//! Scheduler port - run a callback after a delay.
//!
//! # Design
//! - handles are opaque tokens; cancelling an unknown or already fired handle is a no-op
//! - a task must never run after `cancel` returned for its handle
//! - the scheduler is also the clock the components read (throttle bookkeeping, deadlines)

use std::time::Duration;

use super::Clock;

/// Callback run by a scheduler when its timer fires.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Opaque, cancelable token returned by `Scheduler::schedule_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// Scheduler runs tasks after a delay and can cancel them.
pub trait Scheduler: Clock {
    /// Schedule `task` to run once `delay` has elapsed. Never runs `task` inline.
    fn schedule_after(&self, delay: Duration, task: TimerTask) -> TimerHandle;

    /// Disarm a timer. No-op when the timer already fired or was cancelled.
    fn cancel(&self, handle: TimerHandle);
}
