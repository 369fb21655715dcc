//! Impls - scheduler implementations.
//!
//! # Included
//! - **TokioScheduler**: production scheduler on the tokio timer
//! - **ManualScheduler**: virtual clock for deterministic tests and simulations

pub mod manual_scheduler;
pub mod tokio_scheduler;

pub use self::manual_scheduler::ManualScheduler;
pub use self::tokio_scheduler::TokioScheduler;
