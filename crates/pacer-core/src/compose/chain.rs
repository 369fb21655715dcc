//! AsyncChain - callback-style steps composed into one callable.
//!
//! Each step receives its input and a `StepCallback` for its output. The first error
//! (reported through the callback, returned as `Err`, or raised as a panic) goes straight
//! to the final callback and the remaining steps never run. Only the first settlement of
//! a step counts, so a step that calls back and then fails does not re-trigger anything.

use std::sync::Arc;

use crate::callback::StepCallback;
use crate::error::FlowError;
use crate::guard::run_guarded;

/// One callback-style step: `input -> StepCallback<O>`.
pub trait AsyncStep<I, O>: Send + Sync + 'static {
    fn run(&self, input: I, next: StepCallback<O>) -> Result<(), FlowError>;
}

impl<I, O, F> AsyncStep<I, O> for F
where
    F: Fn(I, StepCallback<O>) -> Result<(), FlowError> + Send + Sync + 'static,
{
    fn run(&self, input: I, next: StepCallback<O>) -> Result<(), FlowError> {
        self(input, next)
    }
}

type Runner<I, O> = Arc<dyn Fn(I, StepCallback<O>) + Send + Sync>;

/// Chain of async steps from `I` to `O`. Clones share the steps.
pub struct AsyncChain<I, O> {
    run: Runner<I, O>,
    len: usize,
}

impl<I, O> Clone for AsyncChain<I, O> {
    fn clone(&self) -> Self {
        Self {
            run: Arc::clone(&self.run),
            len: self.len,
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> AsyncChain<I, O> {
    pub fn new<S: AsyncStep<I, O>>(step: S) -> Self {
        Self {
            run: Arc::new(move |input: I, done: StepCallback<O>| invoke(&step, input, done)),
            len: 1,
        }
    }

    /// Append a step fed with this chain's output.
    pub fn then<P, S>(self, step: S) -> AsyncChain<I, P>
    where
        P: Send + 'static,
        S: AsyncStep<O, P>,
    {
        let first = self.run;
        let step = Arc::new(step);
        AsyncChain {
            run: Arc::new(move |input: I, done: StepCallback<P>| {
                let step = Arc::clone(&step);
                let forward = StepCallback::new(move |result: Result<O, FlowError>| match result {
                    Ok(value) => invoke(step.as_ref(), value, done),
                    Err(err) => {
                        done.err(err);
                    }
                });
                first(input, forward);
            }),
            len: self.len + 1,
        }
    }

    /// Run the chain; `done` receives the last step's value or the first error.
    pub fn call<D>(&self, input: I, done: D)
    where
        D: FnOnce(Result<O, FlowError>) + Send + 'static,
    {
        (self.run)(input, StepCallback::new(done));
    }

    /// Async form of [`AsyncChain::call`]. A step that drops its callback without calling
    /// it yields `FlowError::Canceled`.
    pub async fn run(&self, input: I) -> Result<O, FlowError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.call(input, move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(FlowError::Canceled))
    }

    /// Number of steps; at least one.
    pub fn steps(&self) -> usize {
        self.len
    }
}

fn invoke<I, O, S>(step: &S, input: I, done: StepCallback<O>)
where
    O: 'static,
    S: AsyncStep<I, O> + ?Sized,
{
    let guard = done.clone();
    if let Err(err) = run_guarded(|| step.run(input, done)) {
        guard.err(err);
    }
}

/// `compose_async!(s1, s2, ...)` builds an [`AsyncChain`] running `s1` first.
#[macro_export]
macro_rules! compose_async {
    ($first:expr $(, $rest:expr)* $(,)?) => {
        $crate::compose::AsyncChain::new($first)$(.then($rest))*
    };
}
