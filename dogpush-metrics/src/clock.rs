use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Time source shared by meters, timers and the reporter.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic nanoseconds, only meaningful as a difference.
    fn tick_nanos(&self) -> u64;

    /// Wall-clock milliseconds since the Unix epoch.
    fn time_millis(&self) -> u64;
}

#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn tick_nanos(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn time_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    tick: AtomicU64,
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(time_millis: u64) -> Self {
        Self {
            tick: AtomicU64::new(0),
            millis: AtomicU64::new(time_millis),
        }
    }

    /// Moves both the monotonic tick and the wall clock forward.
    pub fn advance(&self, by: std::time::Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.tick.fetch_add(nanos, Ordering::Relaxed);
        self.millis.fetch_add(millis, Ordering::Relaxed);
    }

    pub fn set_time_millis(&self, millis: u64) {
        self.millis.store(millis, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn tick_nanos(&self) -> u64 {
        self.tick.load(Ordering::Relaxed)
    }

    fn time_millis(&self) -> u64 {
        self.millis.load(Ordering::Relaxed)
    }
}
