use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::guard::lock;
use crate::ports::{Scheduler, TimerHandle};
use crate::registry::Entry;

/// Throttled function: runs at most once per `interval`.
///
/// A call in a cold period runs synchronously. Calls arriving sooner are coalesced into
/// one trailing call at the interval boundary, carrying the latest arguments.
pub struct Throttled<A> {
    inner: Arc<ThrottleInner<A>>,
}

struct ThrottleInner<A> {
    scheduler: Arc<dyn Scheduler>,
    interval: Duration,
    func: Box<dyn Fn(A) + Send + Sync>,
    state: Mutex<ThrottleState<A>>,
}

struct ThrottleState<A> {
    last_invocation: Option<Instant>,
    scheduled: Option<TimerHandle>,
    pending_args: Option<A>,
    generation: u64,
}

impl<A> Clone for Throttled<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Send + 'static> Throttled<A> {
    pub fn new<F>(scheduler: Arc<dyn Scheduler>, interval: Duration, func: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(ThrottleInner {
                scheduler,
                interval,
                func: Box::new(func),
                state: Mutex::new(ThrottleState {
                    last_invocation: None,
                    scheduled: None,
                    pending_args: None,
                    generation: 0,
                }),
            }),
        }
    }

    pub fn call(&self, args: A) {
        let now = self.inner.scheduler.now();
        let run_now = {
            let mut state = lock(&self.inner.state);
            let since_last = state.last_invocation.map(|last| now.duration_since(last));
            let cold = state.scheduled.is_none()
                && since_last.is_none_or(|elapsed| elapsed >= self.inner.interval);

            if cold {
                state.last_invocation = Some(now);
                Some(args)
            } else {
                state.pending_args = Some(args);
                if state.scheduled.is_none() {
                    let wait = self
                        .inner
                        .interval
                        .saturating_sub(since_last.unwrap_or_default());
                    state.generation += 1;
                    let generation = state.generation;
                    let inner = Arc::clone(&self.inner);
                    state.scheduled = Some(
                        self.inner
                            .scheduler
                            .schedule_after(wait, Box::new(move || inner.fire(generation))),
                    );
                }
                None
            }
        };

        if let Some(args) = run_now {
            (self.inner.func)(args);
        }
    }

    /// Drop the pending trailing call; the next call still respects the interval.
    pub fn cancel(&self) {
        let mut state = lock(&self.inner.state);
        if let Some(handle) = state.scheduled.take() {
            self.inner.scheduler.cancel(handle);
        }
        state.pending_args = None;
        state.generation += 1;
    }

    /// A trailing call is scheduled.
    pub fn is_pending(&self) -> bool {
        lock(&self.inner.state).scheduled.is_some()
    }
}

impl<A> ThrottleInner<A> {
    fn fire(&self, generation: u64) {
        let args = {
            let mut state = lock(&self.state);
            if state.generation != generation {
                return;
            }
            state.scheduled = None;
            let args = state.pending_args.take();
            if args.is_some() {
                state.last_invocation = Some(self.scheduler.now());
            }
            args
        };
        if let Some(args) = args {
            (self.func)(args);
        }
    }
}

impl<A: Send + 'static> Entry for Throttled<A> {
    fn dispose(&self) {
        self.cancel();
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}
