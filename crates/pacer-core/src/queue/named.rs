//! TaskQueue implementation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};

use super::{QueueStats, QueueWorker};
use crate::callback::Completion;
use crate::domain::QueueId;
use crate::error::FlowError;
use crate::guard::{lock, notify_guarded, run_guarded};
use crate::registry::{Entry, NamedRegistry};

// Phase of one task run, shared by the pump loop and the task's completion.
const RUNNING: u8 = 0;
const COMPLETED_INLINE: u8 = 1;
const DETACHED: u8 = 2;

type DrainFn = Arc<dyn Fn() + Send + Sync>;
type ErrorFn = Arc<dyn Fn(FlowError) + Send + Sync>;

/// FIFO task queue bound to one worker.
///
/// - tasks run strictly in push order, one at a time
/// - the worker is fixed at construction
/// - when the queue runs dry after processing, `drain` fires and the queue leaves its
///   registry (a later `Flow::create_queue` with the same name starts fresh)
/// - a failed task is reported to the error handler and the queue moves on
pub struct TaskQueue<T> {
    inner: Arc<QueueInner<T>>,
}

struct QueueInner<T> {
    id: QueueId,
    name: String,
    worker: Box<dyn QueueWorker<T>>,
    registry: Weak<NamedRegistry>,
    state: Mutex<QueueState<T>>,
}

struct QueueState<T> {
    tasks: VecDeque<T>,
    busy: bool,
    drain: Option<DrainFn>,
    on_error: Option<ErrorFn>,
    completed: u64,
    failed: u64,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Same queue instance.
impl<T> PartialEq for TaskQueue<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Standalone queue, not owned by any registry.
    pub fn new<W: QueueWorker<T>>(name: impl Into<String>, worker: W) -> Self {
        Self::with_registry(name.into(), worker, Weak::new())
    }

    pub(crate) fn with_registry<W: QueueWorker<T>>(
        name: String,
        worker: W,
        registry: Weak<NamedRegistry>,
    ) -> Self {
        let id = QueueId::generate();
        tracing::debug!(queue = %name, %id, "queue created");
        Self {
            inner: Arc::new(QueueInner {
                id,
                name,
                worker: Box::new(worker),
                registry,
                state: Mutex::new(QueueState {
                    tasks: VecDeque::new(),
                    busy: false,
                    drain: None,
                    on_error: None,
                    completed: 0,
                    failed: 0,
                }),
            }),
        }
    }

    pub fn id(&self) -> QueueId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Append a task; starts processing when the queue is idle.
    pub fn push(&self, task: T) {
        self.push_all(std::iter::once(task));
    }

    /// Append tasks in order; starts processing when the queue is idle.
    pub fn push_all<I: IntoIterator<Item = T>>(&self, tasks: I) {
        let tasks: Vec<T> = tasks.into_iter().collect();
        let start = {
            let mut state = lock(&self.inner.state);
            state.tasks.extend(tasks);
            if state.busy || state.tasks.is_empty() {
                false
            } else {
                state.busy = true;
                true
            }
        };
        if start {
            self.inner.pump();
        }
    }

    /// Called each time the queue runs dry after processing.
    pub fn set_drain<F>(&self, drain: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        lock(&self.inner.state).drain = Some(Arc::new(drain));
    }

    /// Receives every task failure. Without a handler failures are logged.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(FlowError) + Send + Sync + 'static,
    {
        lock(&self.inner.state).on_error = Some(Arc::new(handler));
    }

    /// Tasks waiting to run (the running task is not counted).
    pub fn len(&self) -> usize {
        lock(&self.inner.state).tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.inner.state).busy
    }

    pub fn stats(&self) -> QueueStats {
        let state = lock(&self.inner.state);
        QueueStats {
            id: self.inner.id,
            name: self.inner.name.clone(),
            pending: state.tasks.len(),
            busy: state.busy,
            completed: state.completed,
            failed: state.failed,
        }
    }
}

impl<T: Send + 'static> QueueInner<T> {
    /// Run tasks until the queue is empty or a task completes asynchronously.
    ///
    /// Tasks completed inside `worker.run` are handled by this loop; a later completion
    /// re-enters `pump` itself. This keeps the stack flat for synchronous workers.
    fn pump(self: &Arc<Self>) {
        loop {
            let next = {
                let mut state = lock(&self.state);
                let task = state.tasks.pop_front();
                if task.is_none() {
                    state.busy = false;
                }
                task
            };
            let Some(task) = next else {
                self.drained();
                return;
            };

            let phase = Arc::new(AtomicU8::new(RUNNING));
            let done = {
                let inner = Arc::clone(self);
                let phase = Arc::clone(&phase);
                Completion::new(move |result| {
                    inner.record(result);
                    let inline = phase
                        .compare_exchange(
                            RUNNING,
                            COMPLETED_INLINE,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok();
                    if !inline {
                        inner.pump();
                    }
                })
            };

            let guard = done.clone();
            if let Err(err) = run_guarded(|| self.worker.run(task, done)) {
                guard.complete(Err(err));
            }

            let detached = phase
                .compare_exchange(RUNNING, DETACHED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();
            if detached {
                return;
            }
        }
    }

    fn record(&self, result: Result<(), FlowError>) {
        let handler = {
            let mut state = lock(&self.state);
            match result {
                Ok(()) => {
                    state.completed += 1;
                    None
                }
                Err(_) => {
                    state.failed += 1;
                    state.on_error.clone()
                }
            }
        };

        if let Err(err) = result {
            match handler {
                Some(handler) => notify_guarded("queue error", || handler(err)),
                None => tracing::warn!(queue = %self.name, error = %err, "queue task failed"),
            }
        }
    }

    /// Leave the registry and notify `drain`, unless a push restarted the queue after
    /// `pump` saw it empty. The state lock is held across the removal; no path takes the
    /// registry lock before a queue's state lock.
    fn drained(self: &Arc<Self>) {
        let drain = {
            let state = lock(&self.state);
            if state.busy || !state.tasks.is_empty() {
                return;
            }
            if let Some(registry) = self.registry.upgrade() {
                registry.remove_if(&self.name, |queue: &TaskQueue<T>| {
                    Arc::ptr_eq(&queue.inner, self)
                });
            }
            state.drain.clone()
        };
        tracing::debug!(queue = %self.name, id = %self.id, "queue drained");
        if let Some(drain) = drain {
            notify_guarded("drain", || drain());
        }
    }
}

impl<T: Send + 'static> Entry for TaskQueue<T> {
    fn dispose(&self) {
        lock(&self.inner.state).tasks.clear();
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::ManualScheduler;
    use crate::ports::Scheduler;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn log<T>() -> Arc<Mutex<Vec<T>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn synchronous_worker_runs_all_tasks_in_order() {
        let seen = log();
        let sink = Arc::clone(&seen);
        let queue = TaskQueue::new(
            "sync",
            move |task: u32, done: Completion| -> Result<(), FlowError> {
                sink.lock().unwrap().push(task);
                done.done();
                Ok(())
            },
        );

        let drains = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&drains);
        queue.set_drain(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        queue.push_all([1, 2, 3, 4]);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(drains.load(Ordering::SeqCst), 1);
        assert!(!queue.is_busy());
        assert_eq!(queue.stats().completed, 4);
    }

    #[test]
    fn asynchronous_worker_runs_one_task_at_a_time() {
        let scheduler = Arc::new(ManualScheduler::new());
        let seen = log();
        let sink = Arc::clone(&seen);
        let timer = Arc::clone(&scheduler);
        let queue = TaskQueue::new(
            "async",
            move |task: u32, done: Completion| -> Result<(), FlowError> {
                sink.lock().unwrap().push(task);
                timer.schedule_after(
                    Duration::from_millis(5),
                    Box::new(move || {
                        done.done();
                    }),
                );
                Ok(())
            },
        );

        queue.push_all([1, 2, 3]);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert!(queue.is_busy());
        assert_eq!(queue.len(), 2);

        queue.push(4);
        scheduler.advance(Duration::from_millis(5));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);

        scheduler.advance(Duration::from_millis(100));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4]);
        assert!(!queue.is_busy());
        assert!(queue.is_empty());
    }

    #[test]
    fn failures_reach_the_error_handler_and_queue_continues() {
        let seen = log();
        let sink = Arc::clone(&seen);
        let queue = TaskQueue::new(
            "failing",
            move |task: u32, done: Completion| -> Result<(), FlowError> {
                sink.lock().unwrap().push(task);
                match task {
                    1 => {
                        done.fail("reported");
                        Ok(())
                    }
                    2 => Err(FlowError::worker("returned")),
                    3 => panic!("panicked"),
                    _ => {
                        done.done();
                        Ok(())
                    }
                }
            },
        );

        let errors = log();
        let error_sink = Arc::clone(&errors);
        queue.set_error_handler(move |err| error_sink.lock().unwrap().push(err));

        queue.push_all([1, 2, 3, 4]);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(
            *errors.lock().unwrap(),
            vec![
                FlowError::worker("reported"),
                FlowError::worker("returned"),
                FlowError::Panicked("panicked".to_string()),
            ]
        );
        let stats = queue.stats();
        assert_eq!((stats.completed, stats.failed), (1, 3));
    }

    #[test]
    fn error_after_completion_is_ignored() {
        let queue = TaskQueue::new(
            "afterthought",
            |_task: u32, done: Completion| -> Result<(), FlowError> {
                done.done();
                assert!(!done.done());
                Err(FlowError::worker("afterthought"))
            },
        );

        queue.push_all([1, 2]);

        let stats = queue.stats();
        assert_eq!((stats.completed, stats.failed), (2, 0));
    }

    #[test]
    fn long_synchronous_queue_does_not_recurse() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let queue = TaskQueue::new(
            "long",
            move |_task: usize, done: Completion| -> Result<(), FlowError> {
                counter.fetch_add(1, Ordering::SeqCst);
                done.done();
                Ok(())
            },
        );

        queue.push_all(0..100_000);
        assert_eq!(count.load(Ordering::SeqCst), 100_000);
    }

    #[test]
    fn restarted_queue_stays_registered() {
        let registry = NamedRegistry::new("queue");
        let parked: Arc<Mutex<Vec<Completion>>> = log();
        let park = Arc::clone(&parked);
        let (queue, _) = registry
            .lookup_or_insert(
                "jobs",
                |_: &TaskQueue<u32>| true,
                || {
                    TaskQueue::with_registry(
                        "jobs".to_string(),
                        move |_task: u32, done: Completion| -> Result<(), FlowError> {
                            park.lock().unwrap().push(done);
                            Ok(())
                        },
                        Arc::downgrade(&registry),
                    )
                },
            )
            .unwrap();
        let drains = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&drains);
        queue.set_drain(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // A push lands between `pump` finding the queue empty and the drain step.
        queue.push(1);
        queue.inner.drained();

        assert!(registry.contains("jobs"));
        assert_eq!(drains.load(Ordering::SeqCst), 0);

        let done = parked.lock().unwrap().pop().unwrap();
        done.done();
        assert!(!registry.contains("jobs"));
        assert_eq!(drains.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pushes_racing_the_drain_never_overlap() {
        let active = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let (running, overlapped) = (Arc::clone(&active), Arc::clone(&overlaps));
        let queue = TaskQueue::new(
            "racing",
            move |_task: u32, done: Completion| -> Result<(), FlowError> {
                if running.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlapped.fetch_add(1, Ordering::SeqCst);
                }
                let running = Arc::clone(&running);
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    done.done();
                });
                Ok(())
            },
        );

        let pushers: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    for task in 0..50 {
                        queue.push(task);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for pusher in pushers {
            pusher.await.unwrap();
        }
        while queue.stats().completed < 400 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(queue.stats().completed, 400);
    }

    #[test]
    fn standalone_queue_drains_each_cycle() {
        let queue = TaskQueue::new(
            "cycles",
            |_task: u8, done: Completion| -> Result<(), FlowError> {
                done.done();
                Ok(())
            },
        );
        let drains = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&drains);
        queue.set_drain(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        queue.push(1);
        queue.push(2);
        queue.push_all(Vec::new());

        assert_eq!(drains.load(Ordering::SeqCst), 2);
        assert!(queue.id().to_string().starts_with("queue-"));
        assert_eq!(queue.name(), "cycles");
    }
}
