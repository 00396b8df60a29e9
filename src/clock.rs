//! Clock abstractions feeding the token bucket its `now_micros` argument.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Clock abstraction so timing can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in microseconds.
    fn now_micros(&self) -> u64;
}

/// Wall clock backed by `SystemTime::now()`, in microseconds since the Unix epoch.
///
/// Notes: every process sharing a bucket must use a comparable time base, so a
/// process-local monotonic clock would not work here. Small regressions (NTP
/// steps) are tolerated by the bucket, which never refills on negative elapsed time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        u64::try_from(since_epoch.as_micros()).unwrap_or(u64::MAX)
    }
}

/// Settable clock for deterministic tests. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    /// Start the clock at `micros`.
    pub fn new(micros: u64) -> Self {
        Self { micros: Arc::new(AtomicU64::new(micros)) }
    }

    /// Jump to an absolute time, backwards included.
    pub fn set(&self, micros: u64) {
        self.micros.store(micros, Ordering::SeqCst);
    }

    /// Move forward by `micros`.
    pub fn advance(&self, micros: u64) {
        self.micros.fetch_add(micros, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.micros.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_past_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_micros() > 1_577_836_800_000_000);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(10);
        let other = clock.clone();
        clock.advance(5);
        assert_eq!(other.now_micros(), 15);
        other.set(3);
        assert_eq!(clock.now_micros(), 3);
    }
}
