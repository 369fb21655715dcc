//! Once-only callbacks, one named type per role.
//!
//! Workers receive a callback they are expected to call exactly once. Every type here
//! shares the same rule: the first call wins, later calls return `false` and do nothing.
//! Handles are `Clone`, so the runner keeps a copy to report a synchronous `Err` or panic
//! without re-triggering a callback the worker already used.
//!
//! | type              | handed to                  | carries                    |
//! |-------------------|----------------------------|----------------------------|
//! | `Completion`      | queue worker, per task     | `Result<(), FlowError>`    |
//! | `Settle<T>`       | process worker             | `Result<T, FlowError>`     |
//! | `StepCallback<T>` | async composition step     | `Result<T, FlowError>`     |

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::FlowError;
use crate::guard::lock;

type Slot<R> = Arc<Mutex<Option<Box<dyn FnOnce(R) + Send>>>>;

/// Shared once-slot behind every role type.
pub(crate) struct OnceCallback<R> {
    slot: Slot<R>,
}

impl<R> Clone for OnceCallback<R> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<R: 'static> OnceCallback<R> {
    pub(crate) fn new<F>(callback: F) -> Self
    where
        F: FnOnce(R) + Send + 'static,
    {
        Self {
            slot: Arc::new(Mutex::new(Some(Box::new(callback)))),
        }
    }

    /// Invoke the callback if nobody did yet. The lock is released before the call.
    pub(crate) fn call(&self, value: R) -> bool {
        let callback = lock(&self.slot).take();
        match callback {
            Some(callback) => {
                callback(value);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_called(&self) -> bool {
        lock(&self.slot).is_none()
    }
}

/// Handed to a queue worker together with each task.
#[derive(Clone)]
pub struct Completion {
    inner: OnceCallback<Result<(), FlowError>>,
}

impl Completion {
    pub(crate) fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Result<(), FlowError>) + Send + 'static,
    {
        Self {
            inner: OnceCallback::new(callback),
        }
    }

    /// The task finished successfully.
    pub fn done(&self) -> bool {
        self.inner.call(Ok(()))
    }

    /// The task failed; the queue reports the error and moves on.
    pub fn fail(&self, err: impl Into<FlowError>) -> bool {
        self.inner.call(Err(err.into()))
    }

    pub fn complete(&self, result: Result<(), FlowError>) -> bool {
        self.inner.call(result)
    }

    pub fn is_completed(&self) -> bool {
        self.inner.is_called()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Handed to a process worker; settling fans the result out to every waiter.
pub struct Settle<T> {
    inner: OnceCallback<Result<T, FlowError>>,
}

impl<T> Clone for Settle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Settle<T> {
    pub(crate) fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Result<T, FlowError>) + Send + 'static,
    {
        Self {
            inner: OnceCallback::new(callback),
        }
    }

    pub fn ok(&self, value: T) -> bool {
        self.inner.call(Ok(value))
    }

    pub fn err(&self, err: impl Into<FlowError>) -> bool {
        self.inner.call(Err(err.into()))
    }

    pub fn settle(&self, result: Result<T, FlowError>) -> bool {
        self.inner.call(result)
    }

    pub fn is_settled(&self) -> bool {
        self.inner.is_called()
    }
}

impl<T: 'static> fmt::Debug for Settle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settle")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Handed to each step of an `AsyncChain`; its result feeds the next step.
pub struct StepCallback<T> {
    inner: OnceCallback<Result<T, FlowError>>,
}

impl<T> Clone for StepCallback<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> StepCallback<T> {
    pub(crate) fn new<F>(callback: F) -> Self
    where
        F: FnOnce(Result<T, FlowError>) + Send + 'static,
    {
        Self {
            inner: OnceCallback::new(callback),
        }
    }

    pub fn ok(&self, value: T) -> bool {
        self.inner.call(Ok(value))
    }

    pub fn err(&self, err: impl Into<FlowError>) -> bool {
        self.inner.call(Err(err.into()))
    }

    pub fn call(&self, result: Result<T, FlowError>) -> bool {
        self.inner.call(result)
    }

    pub fn is_called(&self) -> bool {
        self.inner.is_called()
    }
}

impl<T: 'static> fmt::Debug for StepCallback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepCallback")
            .field("called", &self.is_called())
            .finish()
    }
}
