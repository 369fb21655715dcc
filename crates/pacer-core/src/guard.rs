//! Small helpers shared by every component.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::FlowError;

/// Lock a mutex, recovering the data if a user callback panicked while it was held.
///
/// No component invokes user code while holding its own lock, so a poisoned lock
/// still guards consistent state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run a worker body, turning a panic into `FlowError::Panicked`.
pub(crate) fn run_guarded<F>(body: F) -> Result<(), FlowError>
where
    F: FnOnce() -> Result<(), FlowError>,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(payload) => {
            let err = FlowError::from_panic(payload);
            tracing::warn!(error = %err, "worker panicked");
            Err(err)
        }
    }
}

/// Run a notification callback; a panic is logged and swallowed so the remaining
/// callbacks still run.
pub(crate) fn notify_guarded<F: FnOnce()>(what: &'static str, callback: F) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
        let err = FlowError::from_panic(payload);
        tracing::warn!(error = %err, "{what} callback panicked");
    }
}
