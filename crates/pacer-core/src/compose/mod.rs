//! Compose - function composition and wrapping.
//!
//! - **sync**: `Compose` / `compose!`, plain function pipelines
//! - **chain**: `AsyncChain` / `compose_async!`, callback-style steps with short-circuiting errors
//! - **wrap**: `wrap`, `curry`, `flip`

pub mod chain;
pub mod sync;
pub mod wrap;

pub use self::chain::{AsyncChain, AsyncStep};
pub use self::sync::Compose;
pub use self::wrap::{Wrapped, curry, flip, wrap};
