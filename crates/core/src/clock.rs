//! Unix-seconds time source.
//!
//! Token freshness is measured in whole seconds since the epoch, matching the
//! timestamp embedded in every payload.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Source of the current unix time in seconds.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_unix: i64) -> Self {
        Self {
            now: AtomicI64::new(now_unix),
        }
    }

    pub fn set(&self, now_unix: i64) {
        self.now.store(now_unix, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl<C> Clock for Arc<C>
where
    C: Clock + ?Sized,
{
    fn now_unix(&self) -> i64 {
        (**self).now_unix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_700_000_000);
        clock.advance(10);
        assert_eq!(clock.now_unix(), 1_700_000_010);

        clock.set(5);
        assert_eq!(clock.now_unix(), 5);
    }

    #[test]
    fn system_clock_is_past_2023() {
        assert!(SystemClock.now_unix() > 1_700_000_000);
    }

    #[test]
    fn shared_clock_delegates() {
        let clock = Arc::new(ManualClock::new(42));
        let shared: Arc<dyn Clock> = clock.clone();
        clock.advance(1);
        assert_eq!(shared.now_unix(), 43);
    }
}
