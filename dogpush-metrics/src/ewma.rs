use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) const TICK_INTERVAL_SECS: u64 = 5;
pub(crate) const TICK_INTERVAL_NANOS: u64 = TICK_INTERVAL_SECS * 1_000_000_000;

/// Exponentially weighted moving average of an event rate, ticked every
/// [`TICK_INTERVAL_SECS`].
#[derive(Debug)]
pub(crate) struct Ewma {
    alpha: f64,
    uncounted: AtomicU64,
    state: Mutex<EwmaState>,
}

#[derive(Debug, Default)]
struct EwmaState {
    initialized: bool,
    /// Events per second.
    rate: f64,
}

impl Ewma {
    pub(crate) fn minutes(minutes: f64) -> Self {
        let alpha = 1.0 - (-(TICK_INTERVAL_SECS as f64) / 60.0 / minutes).exp();
        Self {
            alpha,
            uncounted: AtomicU64::new(0),
            state: Mutex::new(EwmaState::default()),
        }
    }

    pub(crate) fn update(&self, n: u64) {
        self.uncounted.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn tick(&self) {
        let count = self.uncounted.swap(0, Ordering::Relaxed);
        let instant_rate = count as f64 / TICK_INTERVAL_SECS as f64;

        let mut state = self.state.lock();
        if state.initialized {
            state.rate += self.alpha * (instant_rate - state.rate);
        } else {
            state.rate = instant_rate;
            state.initialized = true;
        }
    }

    /// Events per second.
    pub(crate) fn rate(&self) -> f64 {
        self.state.lock().rate
    }
}
