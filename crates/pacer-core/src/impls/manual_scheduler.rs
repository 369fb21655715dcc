//! ManualScheduler - deterministic scheduler on a virtual clock.
//!
//! Nothing fires until the test calls `advance` or `run_until_idle`. Timers fire in
//! deadline order (ties in scheduling order) and the clock jumps to each deadline
//! before its callback runs, so callbacks observe exact times.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::guard::lock;
use crate::ports::{Clock, FixedClock, Scheduler, TimerHandle, TimerTask};

#[derive(Default)]
struct ManualState {
    next_id: u64,
    timers: BTreeMap<(Instant, u64), TimerTask>,
    deadlines: HashMap<u64, Instant>,
}

pub struct ManualScheduler {
    start: Instant,
    clock: FixedClock,
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        let start = Instant::now();
        Self {
            start,
            clock: FixedClock::new(start),
            state: Mutex::new(ManualState::default()),
        }
    }

    /// Virtual time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        self.clock.now().duration_since(self.start)
    }

    /// Number of armed timers.
    pub fn pending(&self) -> usize {
        lock(&self.state).timers.len()
    }

    /// Move the clock forward by `by`, firing every timer that falls due on the way,
    /// including timers scheduled by the callbacks themselves. Returns how many fired.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.clock.now() + by;
        let mut fired = 0;

        loop {
            let next = {
                let mut state = lock(&self.state);
                let due = match state.timers.first_key_value() {
                    Some((&(at, id), _)) if at <= target => Some((at, id)),
                    _ => None,
                };
                due.and_then(|(at, id)| {
                    state.deadlines.remove(&id);
                    state.timers.remove(&(at, id)).map(|task| (at, task))
                })
            };

            let Some((at, task)) = next else {
                break;
            };
            self.clock.advance_to(at);
            task();
            fired += 1;
        }

        self.clock.advance_to(target);
        fired
    }

    /// Fire every timer due now (zero-delay work) without moving the clock.
    pub fn run_until_idle(&self) -> usize {
        self.advance(Duration::ZERO)
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualScheduler {
    fn now(&self) -> Instant {
        self.clock.now()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_after(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        // A deadline past the representable range never comes due.
        let Some(at) = self.clock.now().checked_add(delay) else {
            return TimerHandle::from_raw(id);
        };
        state.timers.insert((at, id), task);
        state.deadlines.insert(id, at);
        TimerHandle::from_raw(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        let mut state = lock(&self.state);
        if let Some(at) = state.deadlines.remove(&handle.as_raw()) {
            state.timers.remove(&(at, handle.as_raw()));
        }
    }
}
