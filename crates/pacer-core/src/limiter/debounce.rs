use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::guard::lock;
use crate::ports::{Scheduler, TimerHandle};
use crate::registry::Entry;

/// Debounced function: runs once after a quiet period of `delay`.
///
/// - trailing mode: every call re-arms the timer; the call that ends the burst wins
/// - `immediate` mode: the first call of a burst runs synchronously, the rest of the
///   burst is swallowed; the burst ends `delay` after its last call
pub struct Debounced<A> {
    inner: Arc<DebounceInner<A>>,
}

struct DebounceInner<A> {
    scheduler: Arc<dyn Scheduler>,
    delay: Duration,
    immediate: bool,
    func: Box<dyn Fn(A) + Send + Sync>,
    state: Mutex<DebounceState<A>>,
}

struct DebounceState<A> {
    pending: Option<TimerHandle>,
    last_args: Option<A>,
    /// Bumped on every re-arm; a timer whose generation is stale does nothing.
    generation: u64,
}

impl<A> Clone for Debounced<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Send + 'static> Debounced<A> {
    pub fn new<F>(scheduler: Arc<dyn Scheduler>, delay: Duration, func: F, immediate: bool) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(DebounceInner {
                scheduler,
                delay,
                immediate,
                func: Box::new(func),
                state: Mutex::new(DebounceState {
                    pending: None,
                    last_args: None,
                    generation: 0,
                }),
            }),
        }
    }

    pub fn call(&self, args: A) {
        let run_now = {
            let mut state = lock(&self.inner.state);
            let in_burst = state.pending.is_some();
            if let Some(handle) = state.pending.take() {
                self.inner.scheduler.cancel(handle);
            }
            state.generation += 1;
            let generation = state.generation;

            let run_now = if self.inner.immediate {
                state.last_args = None;
                (!in_burst).then_some(args)
            } else {
                state.last_args = Some(args);
                None
            };

            let inner = Arc::clone(&self.inner);
            state.pending = Some(self.inner.scheduler.schedule_after(
                self.inner.delay,
                Box::new(move || inner.fire(generation)),
            ));
            run_now
        };

        if let Some(args) = run_now {
            (self.inner.func)(args);
        }
    }

    /// Drop the pending trailing call, if any.
    pub fn cancel(&self) {
        let mut state = lock(&self.inner.state);
        if let Some(handle) = state.pending.take() {
            self.inner.scheduler.cancel(handle);
        }
        state.last_args = None;
        state.generation += 1;
    }

    /// A burst is in progress (a timer is armed).
    pub fn is_pending(&self) -> bool {
        lock(&self.inner.state).pending.is_some()
    }
}

impl<A> DebounceInner<A> {
    fn fire(&self, generation: u64) {
        let args = {
            let mut state = lock(&self.state);
            if state.generation != generation {
                return;
            }
            state.pending = None;
            state.last_args.take()
        };
        if let Some(args) = args {
            (self.func)(args);
        }
    }
}

impl<A: Send + 'static> Entry for Debounced<A> {
    fn dispose(&self) {
        self.cancel();
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::ManualScheduler;

    fn recording(
        scheduler: &Arc<ManualScheduler>,
        delay_ms: u64,
        immediate: bool,
    ) -> (Debounced<u32>, Arc<Mutex<Vec<u32>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let debounced = Debounced::new(
            scheduler.clone(),
            Duration::from_millis(delay_ms),
            move |i| sink.lock().unwrap().push(i),
            immediate,
        );
        (debounced, calls)
    }

    #[test]
    fn burst_fires_once_with_last_args() {
        let scheduler = Arc::new(ManualScheduler::new());
        let (debounced, calls) = recording(&scheduler, 10, false);

        for i in 1..=10 {
            debounced.call(i);
            scheduler.advance(Duration::from_millis(1));
        }
        assert!(calls.lock().unwrap().is_empty());
        assert!(debounced.is_pending());

        scheduler.advance(Duration::from_millis(10));
        assert_eq!(*calls.lock().unwrap(), vec![10]);
        assert!(!debounced.is_pending());
    }

    #[test]
    fn separate_bursts_fire_separately() {
        let scheduler = Arc::new(ManualScheduler::new());
        let (debounced, calls) = recording(&scheduler, 10, false);

        debounced.call(1);
        scheduler.advance(Duration::from_millis(20));
        debounced.call(2);
        scheduler.advance(Duration::from_millis(20));

        assert_eq!(*calls.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn immediate_fires_first_call_and_swallows_the_rest() {
        let scheduler = Arc::new(ManualScheduler::new());
        let (debounced, calls) = recording(&scheduler, 10, true);

        debounced.call(1);
        assert_eq!(*calls.lock().unwrap(), vec![1]);

        debounced.call(2);
        scheduler.advance(Duration::from_millis(5));
        debounced.call(3);
        scheduler.advance(Duration::from_millis(50));
        assert_eq!(*calls.lock().unwrap(), vec![1]);

        debounced.call(4);
        assert_eq!(*calls.lock().unwrap(), vec![1, 4]);
    }

    #[test]
    fn cancel_drops_trailing_call() {
        let scheduler = Arc::new(ManualScheduler::new());
        let (debounced, calls) = recording(&scheduler, 10, false);

        debounced.call(1);
        debounced.cancel();
        scheduler.advance(Duration::from_millis(100));

        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(scheduler.pending(), 0);
    }
}
