use std::any::Any;
use std::path::PathBuf;

use thiserror::Error;

/// Error delivered through a completion, settle, or step callback.
///
/// Never returned synchronously from the `Flow` API: asynchronous failures always
/// travel through the callback argument. `Clone` so one result can fan out to many waiters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    /// The worker reported a failure (or returned `Err` before calling back).
    #[error("{0}")]
    Worker(String),

    /// The worker or step panicked; the payload message is kept.
    #[error("panicked: {0}")]
    Panicked(String),

    /// The deadline elapsed before the work settled.
    #[error("timeout")]
    Timeout,

    /// The process was canceled. Only observable through the async adapters.
    #[error("canceled")]
    Canceled,
}

impl FlowError {
    pub fn worker(message: impl Into<String>) -> Self {
        FlowError::Worker(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FlowError::Timeout)
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        FlowError::Panicked(message)
    }
}

impl From<&str> for FlowError {
    fn from(message: &str) -> Self {
        FlowError::Worker(message.to_string())
    }
}

impl From<String> for FlowError {
    fn from(message: String) -> Self {
        FlowError::Worker(message)
    }
}

/// Error returned synchronously when looking up a named entry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{kind} '{name}' is already registered with a different type")]
    TypeMismatch { kind: &'static str, name: String },
}

/// Error while loading a `FlowConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
