//! Queue module: named FIFO task queue bound to exactly one worker.

mod named;
mod stats;

pub use named::TaskQueue;
pub use stats::QueueStats;

use crate::callback::Completion;
use crate::error::FlowError;

/// Worker bound to a task queue.
///
/// Called with one task at a time; the queue stays busy until `done` is completed.
/// Returning `Err` (or panicking) before completing counts as completing with that error.
/// The queue owns ordering and the busy flag; the worker only reports through `Completion`.
pub trait QueueWorker<T>: Send + Sync + 'static {
    fn run(&self, task: T, done: Completion) -> Result<(), FlowError>;
}

impl<T, F> QueueWorker<T> for F
where
    F: Fn(T, Completion) -> Result<(), FlowError> + Send + Sync + 'static,
{
    fn run(&self, task: T, done: Completion) -> Result<(), FlowError> {
        self(task, done)
    }
}
