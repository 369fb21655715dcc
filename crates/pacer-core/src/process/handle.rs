use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use super::{ProcessStatus, ProcessWorker};
use crate::callback::Settle;
use crate::domain::ProcessId;
use crate::error::FlowError;
use crate::guard::{lock, notify_guarded, run_guarded};
use crate::ports::{Scheduler, TimerHandle};
use crate::registry::{Entry, NamedRegistry};

type Waiter<T> = Box<dyn FnOnce(Result<T, FlowError>) + Send>;

/// Handle to one process instance. Clones share the instance.
pub struct Process<T> {
    inner: Arc<ProcessInner<T>>,
}

struct ProcessInner<T> {
    id: ProcessId,
    name: String,
    scheduler: Arc<dyn Scheduler>,
    registry: Weak<NamedRegistry>,
    state: Mutex<ProcessState<T>>,
}

struct ProcessState<T> {
    status: ProcessStatus,
    result: Option<Result<T, FlowError>>,
    waiters: Vec<Waiter<T>>,
    worker: Option<Box<dyn ProcessWorker<T>>>,
    start: Option<TimerHandle>,
    timeout: Option<TimerHandle>,
}

impl<T> Clone for Process<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Same process instance.
impl<T> PartialEq for Process<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> std::fmt::Debug for Process<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("status", &lock(&self.inner.state).status)
            .finish()
    }
}

impl<T: Clone + Send + 'static> Process<T> {
    /// Standalone process, not owned by any registry. The worker starts on the next
    /// scheduler turn.
    pub fn spawn<W: ProcessWorker<T>>(
        scheduler: Arc<dyn Scheduler>,
        name: impl Into<String>,
        worker: W,
        timeout: Option<Duration>,
    ) -> Self {
        let process = Self::create(name.into(), scheduler, Box::new(worker), Weak::new());
        process.launch(timeout);
        process
    }

    /// Build an `Idle` process without arming anything; see `launch`.
    pub(crate) fn create(
        name: String,
        scheduler: Arc<dyn Scheduler>,
        worker: Box<dyn ProcessWorker<T>>,
        registry: Weak<NamedRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(ProcessInner {
                id: ProcessId::generate(),
                name,
                scheduler,
                registry,
                state: Mutex::new(ProcessState {
                    status: ProcessStatus::Idle,
                    result: None,
                    waiters: Vec::new(),
                    worker: Some(worker),
                    start: None,
                    timeout: None,
                }),
            }),
        }
    }

    /// Arm the timeout and schedule the worker start.
    pub(crate) fn launch(&self, timeout: Option<Duration>) {
        let scheduler = &self.inner.scheduler;
        let mut state = lock(&self.inner.state);
        if !state.status.is_live() {
            return;
        }

        if let Some(limit) = timeout {
            let inner = Arc::clone(&self.inner);
            state.timeout = Some(scheduler.schedule_after(
                limit,
                Box::new(move || inner.finish(Err(FlowError::Timeout), true)),
            ));
        }

        let inner = Arc::clone(&self.inner);
        state.start = Some(scheduler.schedule_after(
            Duration::ZERO,
            Box::new(move || inner.run_worker()),
        ));
        tracing::debug!(
            process = %self.inner.name,
            process_id = %self.inner.id,
            timeout_ms = timeout.map(|t| t.as_millis() as u64),
            "process created"
        );
    }

    pub fn id(&self) -> ProcessId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn status(&self) -> ProcessStatus {
        lock(&self.inner.state).status
    }

    pub fn is_live(&self) -> bool {
        self.status().is_live()
    }

    /// Stored result, once settled or timed out.
    pub fn result(&self) -> Option<Result<T, FlowError>> {
        lock(&self.inner.state).result.clone()
    }

    /// Register a waiter. Waiters run in registration order with a clone of the result;
    /// on an already settled process the waiter runs immediately. A canceled process
    /// drops the waiter without calling it.
    pub fn when_done<F>(&self, callback: F) -> Self
    where
        F: FnOnce(Result<T, FlowError>) + Send + 'static,
    {
        let stored = {
            let mut state = lock(&self.inner.state);
            if state.status == ProcessStatus::Canceled {
                return self.clone();
            }
            match state.result.clone() {
                Some(result) => result,
                None => {
                    state.waiters.push(Box::new(callback));
                    return self.clone();
                }
            }
        };

        notify_guarded("process waiter", || callback(stored));
        self.clone()
    }

    /// Cancel a live process: waiters are dropped unnotified, a pending start never runs
    /// the worker and late settles are ignored. Returns `false` when already final.
    pub fn cancel(&self) -> bool {
        let dropped = {
            let mut state = lock(&self.inner.state);
            if !state.status.is_live() {
                return false;
            }
            state.status = ProcessStatus::Canceled;
            self.inner.disarm(&mut state);
            let worker = state.worker.take();
            (std::mem::take(&mut state.waiters), worker)
        };
        drop(dropped);

        self.inner.unregister();
        tracing::debug!(
            process = %self.inner.name,
            process_id = %self.inner.id,
            "process canceled"
        );
        true
    }

    /// Wait for the result. A canceled process yields `FlowError::Canceled`.
    pub async fn wait(&self) -> Result<T, FlowError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.when_done(move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(FlowError::Canceled))
    }
}

impl<T: Clone + Send + 'static> ProcessInner<T> {
    fn run_worker(self: &Arc<Self>) {
        let worker = {
            let mut state = lock(&self.state);
            state.start = None;
            if state.status != ProcessStatus::Idle {
                return;
            }
            state.status = ProcessStatus::Running;
            state.worker.take()
        };
        let Some(worker) = worker else {
            return;
        };

        tracing::debug!(process = %self.name, process_id = %self.id, "process started");
        let inner = Arc::clone(self);
        let settle = Settle::new(move |result| inner.finish(result, false));
        let guard = settle.clone();
        if let Err(err) = run_guarded(|| worker.start(settle)) {
            guard.settle(Err(err));
        }
    }

    fn finish(self: &Arc<Self>, result: Result<T, FlowError>, timed_out: bool) {
        let (waiters, result) = {
            let mut state = lock(&self.state);
            if !state.status.is_live() {
                return;
            }
            state.status = match (&result, timed_out) {
                (_, true) => ProcessStatus::TimedOut,
                (Ok(_), false) => ProcessStatus::Done,
                (Err(_), false) => ProcessStatus::Failed,
            };
            self.disarm(&mut state);
            state.worker = None;
            state.result = Some(result.clone());
            (std::mem::take(&mut state.waiters), result)
        };

        self.unregister();
        match &result {
            Ok(_) => tracing::debug!(
                process = %self.name,
                process_id = %self.id,
                waiters = waiters.len(),
                "process settled"
            ),
            Err(err) => tracing::debug!(
                process = %self.name,
                process_id = %self.id,
                waiters = waiters.len(),
                error = %err,
                "process failed"
            ),
        }

        for waiter in waiters {
            let result = result.clone();
            notify_guarded("process waiter", || waiter(result));
        }
    }

    fn disarm(&self, state: &mut ProcessState<T>) {
        for handle in [state.start.take(), state.timeout.take()].into_iter().flatten() {
            self.scheduler.cancel(handle);
        }
    }

    fn unregister(self: &Arc<Self>) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_if(&self.name, |process: &Process<T>| {
                Arc::ptr_eq(&process.inner, self)
            });
        }
    }
}

impl<T: Clone + Send + 'static> Entry for Process<T> {
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
    use crate::impls::{ManualScheduler, TokioScheduler};

    type Results = Arc<Mutex<Vec<(&'static str, Result<u32, FlowError>)>>>;

    fn results() -> Results {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn waiter(
        results: &Results,
        tag: &'static str,
    ) -> impl FnOnce(Result<u32, FlowError>) + Send + use<> {
        let sink = Arc::clone(results);
        move |result| sink.lock().unwrap().push((tag, result))
    }

    /// Worker that parks its `Settle` for the test to call.
    fn parked() -> (Arc<Mutex<Option<Settle<u32>>>>, impl ProcessWorker<u32>) {
        let slot = Arc::new(Mutex::new(None));
        let park = Arc::clone(&slot);
        let worker = move |settle: Settle<u32>| -> Result<(), FlowError> {
            *park.lock().unwrap() = Some(settle);
            Ok(())
        };
        (slot, worker)
    }

    #[test]
    fn worker_starts_on_the_next_turn_and_fans_out() {
        let scheduler = Arc::new(ManualScheduler::new());
        let (slot, worker) = parked();
        let out = results();

        let process = Process::spawn(scheduler.clone(), "load", worker, None);
        process.when_done(waiter(&out, "a")).when_done(waiter(&out, "b"));
        assert_eq!(process.status(), ProcessStatus::Idle);
        assert!(slot.lock().unwrap().is_none());

        scheduler.run_until_idle();
        assert_eq!(process.status(), ProcessStatus::Running);

        let settle = slot.lock().unwrap().clone().unwrap();
        assert!(settle.ok(7));
        assert!(!settle.ok(8));

        process.when_done(waiter(&out, "late"));
        assert_eq!(
            *out.lock().unwrap(),
            vec![("a", Ok(7)), ("b", Ok(7)), ("late", Ok(7))]
        );
        assert_eq!(process.status(), ProcessStatus::Done);
        assert_eq!(process.result(), Some(Ok(7)));
    }

    #[test]
    fn timeout_settles_every_waiter() {
        let scheduler = Arc::new(ManualScheduler::new());
        let (slot, worker) = parked();
        let out = results();

        let process = Process::spawn(
            scheduler.clone(),
            "slow",
            worker,
            Some(Duration::from_millis(100)),
        );
        process.when_done(waiter(&out, "a"));

        scheduler.advance(Duration::from_millis(99));
        assert!(out.lock().unwrap().is_empty());

        scheduler.advance(Duration::from_millis(1));
        assert_eq!(*out.lock().unwrap(), vec![("a", Err(FlowError::Timeout))]);
        assert_eq!(process.status(), ProcessStatus::TimedOut);

        let settle = slot.lock().unwrap().clone().unwrap();
        assert!(settle.ok(1));
        assert_eq!(process.result(), Some(Err(FlowError::Timeout)));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn cancel_before_start_skips_the_worker() {
        let scheduler = Arc::new(ManualScheduler::new());
        let (slot, worker) = parked();
        let out = results();

        let process = Process::spawn(
            scheduler.clone(),
            "never",
            worker,
            Some(Duration::from_millis(10)),
        );
        process.when_done(waiter(&out, "a"));

        assert!(process.cancel());
        assert!(!process.cancel());
        process.when_done(waiter(&out, "late"));
        scheduler.advance(Duration::from_millis(50));

        assert!(slot.lock().unwrap().is_none());
        assert!(out.lock().unwrap().is_empty());
        assert_eq!(process.status(), ProcessStatus::Canceled);
        assert_eq!(process.result(), None);
    }

    #[test]
    fn cancel_while_running_ignores_the_late_settle() {
        let scheduler = Arc::new(ManualScheduler::new());
        let (slot, worker) = parked();
        let out = results();

        let process = Process::spawn(scheduler.clone(), "running", worker, None);
        process.when_done(waiter(&out, "a"));
        scheduler.run_until_idle();
        assert!(process.cancel());

        let settle = slot.lock().unwrap().clone().unwrap();
        assert!(settle.ok(3));
        assert!(out.lock().unwrap().is_empty());
        assert_eq!(process.status(), ProcessStatus::Canceled);
    }

    #[test]
    fn returned_error_and_panic_fail_the_process() {
        let scheduler = Arc::new(ManualScheduler::new());
        let out = results();

        let failing = Process::spawn(
            scheduler.clone(),
            "failing",
            |_settle: Settle<u32>| Err(FlowError::worker("no input")),
            None,
        );
        failing.when_done(waiter(&out, "failing"));

        let panicking = Process::spawn(
            scheduler.clone(),
            "panicking",
            |_settle: Settle<u32>| -> Result<(), FlowError> { panic!("worker bug") },
            None,
        );
        panicking.when_done(waiter(&out, "panicking"));

        scheduler.run_until_idle();

        assert_eq!(
            *out.lock().unwrap(),
            vec![
                ("failing", Err(FlowError::worker("no input"))),
                ("panicking", Err(FlowError::Panicked("worker bug".to_string()))),
            ]
        );
        assert_eq!(failing.status(), ProcessStatus::Failed);
        assert_eq!(panicking.status(), ProcessStatus::Failed);
    }

    #[test]
    fn panicking_waiter_does_not_starve_the_others() {
        let scheduler = Arc::new(ManualScheduler::new());
        let out = results();

        let process = Process::spawn(
            scheduler.clone(),
            "noisy",
            |settle: Settle<u32>| -> Result<(), FlowError> {
                settle.ok(1);
                Ok(())
            },
            None,
        );
        process
            .when_done(|_| panic!("waiter bug"))
            .when_done(waiter(&out, "b"));
        scheduler.run_until_idle();

        assert_eq!(*out.lock().unwrap(), vec![("b", Ok(1))]);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_resolves_on_the_tokio_timer() {
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::current());
        let process = Process::spawn(
            scheduler,
            "tokio",
            |settle: Settle<u32>| -> Result<(), FlowError> {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    settle.ok(42);
                });
                Ok(())
            },
            Some(Duration::from_secs(1)),
        );

        assert_eq!(process.wait().await, Ok(42));
        assert_eq!(process.wait().await, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_on_canceled_process_reports_canceled() {
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::current());
        let process = Process::spawn(
            scheduler,
            "canceled",
            |_settle: Settle<u32>| -> Result<(), FlowError> { Ok(()) },
            None,
        );

        let waiting = {
            let process = process.clone();
            tokio::spawn(async move { process.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        process.cancel();

        assert_eq!(waiting.await.unwrap(), Err(FlowError::Canceled));
        assert_eq!(process.wait().await, Err(FlowError::Canceled));
    }
}
