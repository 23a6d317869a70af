//! Rate-limited diagnostics for real-time threads.

use crate::Ordering;
use std::sync::atomic::AtomicU64;
use std::time::{Duration, Instant};

/// Allows at most one event per interval. Safe to poll from the render
/// thread: one clock read plus one CAS, no allocation.
#[derive(Debug)]
pub struct ThrottleGate {
    base: Instant,
    interval_nanos: u64,
    /// Nanoseconds since `base` of the last admitted event, 0 = never.
    last: AtomicU64,
}

impl ThrottleGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            base: Instant::now(),
            interval_nanos: interval.as_nanos() as u64,
            last: AtomicU64::new(0),
        }
    }

    /// True when the caller should emit its diagnostic now.
    pub fn admit(&self) -> bool {
        let now = self.base.elapsed().as_nanos() as u64;
        let last = self.last.load(Ordering::Relaxed);
        if last != 0 && now.saturating_sub(last) < self.interval_nanos {
            return false;
        }
        self.last
            .compare_exchange(last, now.max(1), Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}

impl Default for ThrottleGate {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
