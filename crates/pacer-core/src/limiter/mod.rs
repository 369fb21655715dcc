//! Rate limiters: debounce and throttle.
//!
//! Both take a single argument value `A` per call (use a tuple for several) and keep only
//! the most recent one. `Flow::debounce_named` / `Flow::throttle_named` share one
//! controller per name; `Debounced::new` / `Throttled::new` build standalone ones.

mod debounce;
mod throttle;

pub use debounce::Debounced;
pub use throttle::Throttled;
