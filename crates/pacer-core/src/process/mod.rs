//! Process - run-once worker whose result fans out to many waiters.
//!
//! # Lifecycle
//! ```text
//! Idle --start--> Running --settle(Ok)--> Done
//!   |                |    --settle(Err)--> Failed
//!   |                |    --timer-------> TimedOut
//!   +----------------+----cancel()------> Canceled
//! ```
//! - `Idle` and `Running` are live; every other status is final
//! - the first transition to a final status wins; later settles are ignored
//! - the worker starts on the scheduler with zero delay, never inline

mod handle;
mod status;

pub use handle::Process;
pub use status::ProcessStatus;

use crate::callback::Settle;
use crate::error::FlowError;

/// Worker run by a process, at most once.
///
/// Returning `Err` (or panicking) settles the process with that error, unless the worker
/// already settled it.
pub trait ProcessWorker<T>: Send + 'static {
    fn start(self: Box<Self>, settle: Settle<T>) -> Result<(), FlowError>;
}

impl<T, F> ProcessWorker<T> for F
where
    F: FnOnce(Settle<T>) -> Result<(), FlowError> + Send + 'static,
{
    fn start(self: Box<Self>, settle: Settle<T>) -> Result<(), FlowError> {
        (*self)(settle)
    }
}
