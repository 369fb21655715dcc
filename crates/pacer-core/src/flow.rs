//! Flow - owner of the scheduler, the configuration and every named registry.
//!
//! # Design
//! - one `Flow` per application (or per test); nothing is process-global
//! - four registries: debounce, throttle, queue, process
//! - lookups by name are type-checked; reusing a name with another value type is
//!   `RegistryError::TypeMismatch`
//! - `reset` (or dropping the last clone) disposes every entry: timers are disarmed,
//!   pending queue tasks dropped and live processes canceled

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::FlowConfig;
use crate::error::{FlowError, RegistryError};
use crate::limiter::{Debounced, Throttled};
use crate::ports::Scheduler;
use crate::process::{Process, ProcessWorker};
use crate::queue::{QueueWorker, TaskQueue};
use crate::registry::NamedRegistry;
use crate::wait;

/// Registry object. Clones share the same registries.
#[derive(Clone)]
pub struct Flow {
    inner: Arc<FlowInner>,
}

struct FlowInner {
    scheduler: Arc<dyn Scheduler>,
    config: FlowConfig,
    debounce: Arc<NamedRegistry>,
    throttle: Arc<NamedRegistry>,
    queues: Arc<NamedRegistry>,
    processes: Arc<NamedRegistry>,
}

/// Names currently registered, per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowSnapshot {
    pub debounce: Vec<String>,
    pub throttle: Vec<String>,
    pub queues: Vec<String>,
    pub processes: Vec<String>,
}

impl Flow {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_config(scheduler, FlowConfig::default())
    }

    pub fn with_config(scheduler: Arc<dyn Scheduler>, config: FlowConfig) -> Self {
        tracing::debug!(?config, "flow created");
        Self {
            inner: Arc::new(FlowInner {
                scheduler,
                config,
                debounce: NamedRegistry::new("debounce"),
                throttle: NamedRegistry::new("throttle"),
                queues: NamedRegistry::new("queue"),
                processes: NamedRegistry::new("process"),
            }),
        }
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.inner.scheduler
    }

    pub fn config(&self) -> &FlowConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // Rate limiters
    // ------------------------------------------------------------------

    /// Debounced controller for `name`. The first `func` registered under a name is kept;
    /// later calls return that controller and drop their `func`.
    pub fn debounce_named<A, F>(
        &self,
        name: &str,
        delay: Duration,
        func: F,
        immediate: bool,
    ) -> Result<Debounced<A>, RegistryError>
    where
        A: Send + 'static,
        F: Fn(A) + Send + Sync + 'static,
    {
        let scheduler = Arc::clone(&self.inner.scheduler);
        let (debounced, created) = self.inner.debounce.lookup_or_insert(
            name,
            |_: &Debounced<A>| true,
            || Debounced::new(scheduler, delay, func, immediate),
        )?;
        if created {
            tracing::debug!(
                name,
                delay_ms = delay.as_millis() as u64,
                immediate,
                "debounce registered"
            );
        }
        Ok(debounced)
    }

    /// Throttled controller for `name`; first registration wins, like `debounce_named`.
    pub fn throttle_named<A, F>(
        &self,
        name: &str,
        interval: Duration,
        func: F,
    ) -> Result<Throttled<A>, RegistryError>
    where
        A: Send + 'static,
        F: Fn(A) + Send + Sync + 'static,
    {
        let scheduler = Arc::clone(&self.inner.scheduler);
        let (throttled, created) = self.inner.throttle.lookup_or_insert(
            name,
            |_: &Throttled<A>| true,
            || Throttled::new(scheduler, interval, func),
        )?;
        if created {
            tracing::debug!(name, interval_ms = interval.as_millis() as u64, "throttle registered");
        }
        Ok(throttled)
    }

    // ------------------------------------------------------------------
    // Queues
    // ------------------------------------------------------------------

    /// Queue for `name`, bound to `worker` when created here. An existing queue keeps its
    /// own worker; `worker` is dropped without ever running.
    pub fn create_queue<T, W>(
        &self,
        name: &str,
        worker: W,
    ) -> Result<TaskQueue<T>, RegistryError>
    where
        T: Send + 'static,
        W: QueueWorker<T>,
    {
        let registry = Arc::downgrade(&self.inner.queues);
        let (queue, _) = self.inner.queues.lookup_or_insert(
            name,
            |_: &TaskQueue<T>| true,
            || TaskQueue::with_registry(name.to_string(), worker, registry),
        )?;
        Ok(queue)
    }

    /// Existing queue for `name`, if any.
    pub fn queue<T: Send + 'static>(
        &self,
        name: &str,
    ) -> Result<Option<TaskQueue<T>>, RegistryError> {
        self.inner.queues.get(name)
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.inner.queues.contains(name)
    }

    // ------------------------------------------------------------------
    // Processes
    // ------------------------------------------------------------------

    /// Live process for `name`, or a new one running `worker`.
    ///
    /// A new process starts its worker on the next scheduler turn, so `when_done` and
    /// `cancel` on the returned handle always come first. `timeout = None` falls back to
    /// `FlowConfig::default_process_timeout_ms`.
    pub fn worker_with_callback_queue<T, W>(
        &self,
        name: &str,
        worker: W,
        timeout: Option<Duration>,
    ) -> Result<Process<T>, RegistryError>
    where
        T: Clone + Send + 'static,
        W: ProcessWorker<T>,
    {
        let registry = Arc::downgrade(&self.inner.processes);
        let scheduler = Arc::clone(&self.inner.scheduler);
        let (process, created) = self.inner.processes.lookup_or_insert(
            name,
            |existing: &Process<T>| existing.is_live(),
            || Process::create(name.to_string(), scheduler, Box::new(worker), registry),
        )?;

        if created {
            process.launch(timeout.or_else(|| self.inner.config.default_process_timeout()));
        }
        Ok(process)
    }

    /// Live process for `name`, if any.
    pub fn process<T: Clone + Send + 'static>(
        &self,
        name: &str,
    ) -> Result<Option<Process<T>>, RegistryError> {
        self.inner.processes.get(name)
    }

    pub fn has_process(&self, name: &str) -> bool {
        self.inner.processes.contains(name)
    }

    // ------------------------------------------------------------------
    // Waiting
    // ------------------------------------------------------------------

    /// Poll `predicate` every `poll_interval_ms`; see [`wait::wait_for`].
    pub fn wait_for<P, D>(&self, timeout: Option<Duration>, predicate: P, done: D)
    where
        P: FnMut() -> bool + Send + 'static,
        D: FnOnce(Result<(), FlowError>) + Send + 'static,
    {
        wait::wait_for(
            Arc::clone(&self.inner.scheduler),
            self.inner.config.poll_interval(),
            timeout,
            predicate,
            done,
        );
    }

    pub async fn wait_until<P>(
        &self,
        timeout: Option<Duration>,
        predicate: P,
    ) -> Result<(), FlowError>
    where
        P: FnMut() -> bool + Send + 'static,
    {
        wait::wait_until(
            Arc::clone(&self.inner.scheduler),
            self.inner.config.poll_interval(),
            timeout,
            predicate,
        )
        .await
    }

    /// Run `workers` side by side; see [`wait::wait_for_all`].
    pub fn wait_for_all<T, I, D>(&self, timeout: Option<Duration>, workers: I, done: D)
    where
        T: Send + 'static,
        I: IntoIterator<Item = Box<dyn ProcessWorker<T>>>,
        D: FnOnce(Result<Vec<T>, FlowError>) + Send + 'static,
    {
        wait::wait_for_all(Arc::clone(&self.inner.scheduler), timeout, workers, done);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Dispose every entry of every registry. Returns how many entries were dropped.
    pub fn reset(&self) -> usize {
        let dropped = self.inner.clear();
        tracing::debug!(dropped, "flow reset");
        dropped
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            debounce: self.inner.debounce.names(),
            throttle: self.inner.throttle.names(),
            queues: self.inner.queues.names(),
            processes: self.inner.processes.names(),
        }
    }
}

impl FlowInner {
    fn clear(&self) -> usize {
        [&self.debounce, &self.throttle, &self.queues, &self.processes]
            .into_iter()
            .map(|registry| registry.clear())
            .sum()
    }
}

impl Drop for FlowInner {
    fn drop(&mut self) {
        self.clear();
    }
}
