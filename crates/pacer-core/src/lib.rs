//! pacer-core
//!
//! Asynchronous control-flow building blocks driven by an injectable scheduler.
//!
//! # Modules
//! - **ports**: abstractions over time (`Clock`, `Scheduler`)
//! - **impls**: scheduler implementations (`TokioScheduler`, `ManualScheduler`)
//! - **flow**: `Flow`, the explicit owner of every named registry
//! - **limiter**: debounce / throttle controllers
//! - **queue**: named FIFO task queue bound to a single worker
//! - **process**: run-once worker whose result fans out to many waiters
//! - **wait**: predicate polling and gathering of callback-style workers
//! - **compose**: synchronous and callback-style function composition
//!
//! # Example
//! ```ignore
//! let flow = Flow::new(Arc::new(TokioScheduler::current()));
//! let save = flow.debounce_named(
//!     "save",
//!     Duration::from_millis(200),
//!     |doc: String| persist(doc),
//!     false,
//! )?;
//! save.call(draft.clone());
//! ```

pub mod callback;
pub mod compose;
pub mod config;
pub mod domain;
pub mod error;
pub mod flow;
pub mod impls;
pub mod limiter;
pub mod ports;
pub mod process;
pub mod queue;
pub mod wait;

mod guard;
mod registry;

pub use self::callback::{Completion, Settle, StepCallback};
pub use self::compose::{AsyncChain, AsyncStep, Compose, Wrapped};
pub use self::config::FlowConfig;
pub use self::domain::{ProcessId, QueueId};
pub use self::error::{ConfigError, FlowError, RegistryError};
pub use self::flow::{Flow, FlowSnapshot};
pub use self::impls::{ManualScheduler, TokioScheduler};
pub use self::limiter::{Debounced, Throttled};
pub use self::ports::{Clock, FixedClock, Scheduler, SystemClock, TimerHandle, TimerTask};
pub use self::process::{Process, ProcessStatus, ProcessWorker};
pub use self::queue::{QueueStats, QueueWorker, TaskQueue};
