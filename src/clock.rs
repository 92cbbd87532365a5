//! Clock abstraction used by container-metric TTL checks and drain backoff.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Clock abstraction so wall-clock comparisons can be faked in tests.
///
/// Exposes epoch nanoseconds rather than process-relative time because
/// envelope timestamps are stamped against the Unix epoch (§3) and TTL math
/// in the container-metric sink (§4.2) compares directly against them.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_nanos(&self) -> u64;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }
}

/// Test clock that only advances when told to.
#[derive(Debug, Default)]
pub struct FakeClock {
    nanos: AtomicU64,
}

impl FakeClock {
    pub fn new(start_nanos: u64) -> Self {
        Self { nanos: AtomicU64::new(start_nanos) }
    }

    pub fn set(&self, nanos: u64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_nanos: u64) {
        self.nanos.fetch_add(delta_nanos, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_nanos(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_returns_nonzero_epoch_nanos() {
        assert!(SystemClock.now_nanos() > 0);
    }

    #[test]
    fn fake_clock_only_advances_when_told() {
        let clock = FakeClock::new(100);
        assert_eq!(clock.now_nanos(), 100);
        clock.advance(50);
        assert_eq!(clock.now_nanos(), 150);
        clock.set(9);
        assert_eq!(clock.now_nanos(), 9);
    }
}
