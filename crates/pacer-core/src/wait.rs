//! Wait - predicate polling and gathering of callback-style workers.
//!
//! Both primitives report exactly once through their `done` callback and schedule
//! nothing after that.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::callback::{OnceCallback, Settle};
use crate::error::FlowError;
use crate::guard::{lock, run_guarded};
use crate::ports::{Scheduler, TimerHandle};
use crate::process::ProcessWorker;

type Predicate = Box<dyn FnMut() -> bool + Send>;

/// Poll `predicate` now and then every `interval` until it holds or `timeout` elapses.
///
/// - `done(Ok(()))` once the predicate returns `true`
/// - `done(Err(FlowError::Timeout))` when the deadline passes first
/// - a panicking predicate ends the wait with `FlowError::Panicked`
/// - `timeout = None` polls until the predicate holds; so does a timeout too large to
///   represent as a deadline
///
/// The last step is clamped to the time left, so the timeout is reported on time.
pub fn wait_for<P, D>(
    scheduler: Arc<dyn Scheduler>,
    interval: Duration,
    timeout: Option<Duration>,
    predicate: P,
    done: D,
) where
    P: FnMut() -> bool + Send + 'static,
    D: FnOnce(Result<(), FlowError>) + Send + 'static,
{
    let deadline = timeout.and_then(|timeout| scheduler.now().checked_add(timeout));
    let poller = Arc::new(Poller {
        scheduler,
        interval: interval.max(Duration::from_millis(1)),
        deadline,
        predicate: Mutex::new(Box::new(predicate)),
        done: OnceCallback::new(done),
    });
    poller.tick();
}

/// Async form of [`wait_for`].
pub async fn wait_until<P>(
    scheduler: Arc<dyn Scheduler>,
    interval: Duration,
    timeout: Option<Duration>,
    predicate: P,
) -> Result<(), FlowError>
where
    P: FnMut() -> bool + Send + 'static,
{
    let (tx, rx) = tokio::sync::oneshot::channel();
    wait_for(scheduler, interval, timeout, predicate, move |result| {
        let _ = tx.send(result);
    });
    rx.await.unwrap_or(Err(FlowError::Canceled))
}

struct Poller {
    scheduler: Arc<dyn Scheduler>,
    interval: Duration,
    deadline: Option<Instant>,
    predicate: Mutex<Predicate>,
    done: OnceCallback<Result<(), FlowError>>,
}

impl Poller {
    fn tick(self: Arc<Self>) {
        let mut satisfied = false;
        let checked = run_guarded(|| {
            let mut predicate = lock(&self.predicate);
            satisfied = (*predicate)();
            Ok(())
        });

        if let Err(err) = checked {
            self.done.call(Err(err));
            return;
        }
        if satisfied {
            self.done.call(Ok(()));
            return;
        }

        let now = self.scheduler.now();
        let step = match self.deadline {
            Some(deadline) if now >= deadline => {
                tracing::debug!(timeout = true, "wait_for gave up");
                self.done.call(Err(FlowError::Timeout));
                return;
            }
            Some(deadline) => self.interval.min(deadline - now),
            None => self.interval,
        };

        let poller = Arc::clone(&self);
        self.scheduler.schedule_after(step, Box::new(move || poller.tick()));
    }
}

/// Start every worker and collect their values in worker order.
///
/// - `done(Ok(values))` once every worker succeeded (`Ok(vec![])` for no workers)
/// - `done(Err(e))` on the first error; the remaining results are discarded
/// - `done(Err(FlowError::Timeout))` when `timeout` elapses first
///
/// Workers start synchronously, in order. A worker that returns `Err` or panics counts
/// as failed.
pub fn wait_for_all<T, I, D>(
    scheduler: Arc<dyn Scheduler>,
    timeout: Option<Duration>,
    workers: I,
    done: D,
) where
    T: Send + 'static,
    I: IntoIterator<Item = Box<dyn ProcessWorker<T>>>,
    D: FnOnce(Result<Vec<T>, FlowError>) + Send + 'static,
{
    let workers: Vec<Box<dyn ProcessWorker<T>>> = workers.into_iter().collect();
    if workers.is_empty() {
        done(Ok(Vec::new()));
        return;
    }

    let gather = Arc::new(Gather {
        scheduler: Arc::clone(&scheduler),
        state: Mutex::new(GatherState {
            values: workers.iter().map(|_| None).collect(),
            remaining: workers.len(),
            timer: None,
        }),
        done: OnceCallback::new(done),
    });

    if let Some(limit) = timeout {
        let timed_out = Arc::clone(&gather);
        let handle = scheduler.schedule_after(
            limit,
            Box::new(move || timed_out.finish(Err(FlowError::Timeout))),
        );
        lock(&gather.state).timer = Some(handle);
    }

    for (index, worker) in workers.into_iter().enumerate() {
        if gather.done.is_called() {
            break;
        }
        let slot = Arc::clone(&gather);
        let settle = Settle::new(move |result| slot.record(index, result));
        let guard = settle.clone();
        if let Err(err) = run_guarded(|| worker.start(settle)) {
            guard.settle(Err(err));
        }
    }
}

struct Gather<T> {
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<GatherState<T>>,
    done: OnceCallback<Result<Vec<T>, FlowError>>,
}

struct GatherState<T> {
    values: Vec<Option<T>>,
    remaining: usize,
    timer: Option<TimerHandle>,
}

impl<T: Send + 'static> Gather<T> {
    fn record(&self, index: usize, result: Result<T, FlowError>) {
        let value = match result {
            Ok(value) => value,
            Err(err) => return self.finish(Err(err)),
        };

        let complete = {
            let mut state = lock(&self.state);
            if let Some(slot) = state.values.get_mut(index) {
                *slot = Some(value);
            }
            state.remaining -= 1;
            if state.remaining == 0 {
                Some(std::mem::take(&mut state.values).into_iter().flatten().collect())
            } else {
                None
            }
        };

        if let Some(values) = complete {
            self.finish(Ok(values));
        }
    }

    fn finish(&self, result: Result<Vec<T>, FlowError>) {
        if let Some(handle) = lock(&self.state).timer.take() {
            self.scheduler.cancel(handle);
        }
        self.done.call(result);
    }
}
