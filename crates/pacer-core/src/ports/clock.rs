//! Clock port - 時刻の抽象化
//!
//! # 実装
//! - SystemClock（本番用、単調増加の `Instant`）
//! - FixedClock（テスト用、明示的に進めたときだけ動く）

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::guard::lock;

/// Clock は現在時刻を提供
///
/// # テスト容易性
/// - trait により時刻を差し替え可能
/// - テストでは FixedClock（または ManualScheduler）を使用
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock (monotonic).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that stands still until advanced.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<Instant>,
}

impl FixedClock {
    pub fn new(start: Instant) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }

    /// Move to `at`; never moves backwards.
    pub fn advance_to(&self, at: Instant) {
        let mut now = lock(&self.now);
        if at > *now {
            *now = at;
        }
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Instant {
        *lock(&self.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_only_moves_when_advanced() {
        let start = Instant::now();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_millis(30));
        assert_eq!(clock.now(), start + Duration::from_millis(30));
    }

    #[test]
    fn advance_to_is_monotonic() {
        let start = Instant::now();
        let clock = FixedClock::new(start + Duration::from_secs(1));

        clock.advance_to(start);
        assert_eq!(clock.now(), start + Duration::from_secs(1));

        clock.advance_to(start + Duration::from_secs(2));
        assert_eq!(clock.now(), start + Duration::from_secs(2));
    }

    #[test]
    fn system_clock_does_not_go_backwards() {
        let a = SystemClock.now();
        let b = SystemClock.now();
        assert!(b >= a);
    }
}
