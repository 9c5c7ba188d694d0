use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use crate::clock::Clock;
use crate::ewma::{Ewma, TICK_INTERVAL_NANOS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Meter,
    Timer,
}

/// Min/max/mean/stddev of the recorded values.
pub trait Summarizable {
    fn min(&self) -> f64;
    fn max(&self) -> f64;
    fn mean(&self) -> f64;
    fn std_dev(&self) -> f64;
}

/// Access to a quantile snapshot of the recorded values.
pub trait Sampling {
    fn snapshot(&self) -> Snapshot;
}

/// Event count and rates, all rates in events per second.
pub trait Metered {
    fn count(&self) -> u64;
    fn mean_rate(&self) -> f64;
    fn one_minute_rate(&self) -> f64;
    fn five_minute_rate(&self) -> f64;
    fn fifteen_minute_rate(&self) -> f64;
}

#[derive(Debug, Clone)]
pub enum Metric {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    Histogram(Arc<Histogram>),
    Meter(Arc<Meter>),
    Timer(Arc<Timer>),
}

impl Metric {
    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Gauge(_) => MetricKind::Gauge,
            Metric::Histogram(_) => MetricKind::Histogram,
            Metric::Meter(_) => MetricKind::Meter,
            Metric::Timer(_) => MetricKind::Timer,
        }
    }

    pub fn as_metered(&self) -> Option<&dyn Metered> {
        match self {
            Metric::Meter(m) => Some(m.as_ref()),
            Metric::Timer(t) => Some(t.as_ref()),
            _ => None,
        }
    }

    pub fn as_summarizable(&self) -> Option<&dyn Summarizable> {
        match self {
            Metric::Histogram(h) => Some(h.as_ref()),
            Metric::Timer(t) => Some(t.as_ref()),
            _ => None,
        }
    }

    pub fn as_sampling(&self) -> Option<&dyn Sampling> {
        match self {
            Metric::Histogram(h) => Some(h.as_ref()),
            Metric::Timer(t) => Some(t.as_ref()),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicI64,
}

impl Counter {
    #[inline]
    pub fn inc(&self) {
        self.inc_by(1);
    }

    #[inline]
    pub fn inc_by(&self, n: i64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn dec(&self) {
        self.dec_by(1);
    }

    #[inline]
    pub fn dec_by(&self, n: i64) {
        self.count.fetch_sub(n, Ordering::Relaxed);
    }

    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

/// Value read from a gauge callback.
#[derive(Debug, Clone, PartialEq)]
pub enum GaugeValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl GaugeValue {
    /// Numeric reading of the value; booleans map to 1/0 and text has none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GaugeValue::Int(v) => Some(*v as f64),
            GaugeValue::UInt(v) => Some(*v as f64),
            GaugeValue::Float(v) => Some(*v),
            GaugeValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            GaugeValue::Text(_) => None,
        }
    }
}

macro_rules! gauge_value_from {
    ($($ty:ty => $variant:ident as $cast:ty),* $(,)?) => {
        $(
            impl From<$ty> for GaugeValue {
                fn from(v: $ty) -> Self {
                    GaugeValue::$variant(<$cast>::from(v))
                }
            }
        )*
    };
}

gauge_value_from! {
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    f32 => Float as f64,
    f64 => Float as f64,
    bool => Bool as bool,
    String => Text as String,
}

impl From<usize> for GaugeValue {
    fn from(v: usize) -> Self {
        GaugeValue::UInt(v as u64)
    }
}

impl From<&str> for GaugeValue {
    fn from(v: &str) -> Self {
        GaugeValue::Text(v.to_string())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct GaugeError(String);

impl GaugeError {
    pub fn new(msg: impl fmt::Display) -> Self {
        Self(msg.to_string())
    }
}

type GaugeFn = dyn Fn() -> Result<GaugeValue, GaugeError> + Send + Sync;

/// Gauge whose value is computed on every read.
pub struct Gauge {
    read: Box<GaugeFn>,
}

impl Gauge {
    pub fn new<F, V>(f: F) -> Self
    where
        F: Fn() -> V + Send + Sync + 'static,
        V: Into<GaugeValue>,
    {
        Self {
            read: Box::new(move || Ok(f().into())),
        }
    }

    pub fn fallible<F, V>(f: F) -> Self
    where
        F: Fn() -> Result<V, GaugeError> + Send + Sync + 'static,
        V: Into<GaugeValue>,
    {
        Self {
            read: Box::new(move || f().map(Into::into)),
        }
    }

    pub fn value(&self) -> Result<GaugeValue, GaugeError> {
        (self.read)()
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gauge").finish_non_exhaustive()
    }
}

fn new_auto_histogram() -> hdrhistogram::Histogram<u64> {
    match hdrhistogram::Histogram::<u64>::new(3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

fn new_duration_histogram() -> hdrhistogram::Histogram<u64> {
    // Microseconds, up to one hour.
    match hdrhistogram::Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

/// Point-in-time copy of a histogram, values scaled into the reporting unit.
#[derive(Debug, Clone)]
pub struct Snapshot {
    hist: hdrhistogram::Histogram<u64>,
    scale: f64,
}

impl Snapshot {
    pub fn size(&self) -> u64 {
        self.hist.len()
    }

    /// Value at quantile `q` in `0.0..=1.0`; zero for an empty snapshot.
    pub fn value(&self, q: f64) -> f64 {
        if self.hist.is_empty() {
            return 0.0;
        }
        self.hist.value_at_quantile(q.clamp(0.0, 1.0)) as f64 * self.scale
    }

    pub fn median(&self) -> f64 {
        self.value(0.5)
    }

    pub fn p75(&self) -> f64 {
        self.value(0.75)
    }

    pub fn p95(&self) -> f64 {
        self.value(0.95)
    }

    pub fn p98(&self) -> f64 {
        self.value(0.98)
    }

    pub fn p99(&self) -> f64 {
        self.value(0.99)
    }

    pub fn p999(&self) -> f64 {
        self.value(0.999)
    }
}

/// Distribution of `u64` samples.
#[derive(Debug)]
pub struct Histogram {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
    scale: f64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            inner: Mutex::new(new_auto_histogram()),
            scale: 1.0,
        }
    }
}

impl Histogram {
    fn for_durations() -> Self {
        Self {
            inner: Mutex::new(new_duration_histogram()),
            scale: 0.001,
        }
    }

    #[inline]
    pub fn update(&self, value: u64) {
        self.inner.lock().saturating_record(value);
    }

    pub fn count(&self) -> u64 {
        self.inner.lock().len()
    }

    pub fn clear(&self) {
        self.inner.lock().reset();
    }

    fn summary_stat(&self, f: impl FnOnce(&hdrhistogram::Histogram<u64>) -> f64) -> f64 {
        let h = self.inner.lock();
        if h.is_empty() { 0.0 } else { f(&h) * self.scale }
    }
}

impl Summarizable for Histogram {
    fn min(&self) -> f64 {
        self.summary_stat(|h| h.min() as f64)
    }

    fn max(&self) -> f64 {
        self.summary_stat(|h| h.max() as f64)
    }

    fn mean(&self) -> f64 {
        self.summary_stat(|h| h.mean())
    }

    fn std_dev(&self) -> f64 {
        self.summary_stat(|h| h.stdev())
    }
}

impl Sampling for Histogram {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            hist: self.inner.lock().clone(),
            scale: self.scale,
        }
    }
}

/// Marks events and tracks their mean and exponentially weighted rates.
#[derive(Debug)]
pub struct Meter {
    clock: Arc<dyn Clock>,
    count: AtomicU64,
    start_tick: u64,
    last_tick: AtomicU64,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl Meter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let now = clock.tick_nanos();
        Self {
            clock,
            count: AtomicU64::new(0),
            start_tick: now,
            last_tick: AtomicU64::new(now),
            m1: Ewma::minutes(1.0),
            m5: Ewma::minutes(5.0),
            m15: Ewma::minutes(15.0),
        }
    }

    #[inline]
    pub fn mark(&self) {
        self.mark_n(1);
    }

    pub fn mark_n(&self, n: u64) {
        self.tick_if_necessary();
        self.count.fetch_add(n, Ordering::Relaxed);
        self.m1.update(n);
        self.m5.update(n);
        self.m15.update(n);
    }

    fn tick_if_necessary(&self) {
        let old = self.last_tick.load(Ordering::Relaxed);
        let now = self.clock.tick_nanos();
        let age = now.saturating_sub(old);
        if age <= TICK_INTERVAL_NANOS {
            return;
        }

        let aligned = now - age % TICK_INTERVAL_NANOS;
        // Whoever wins the swap catches the averages up; everyone else moves on.
        if self
            .last_tick
            .compare_exchange(old, aligned, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            for _ in 0..age / TICK_INTERVAL_NANOS {
                self.m1.tick();
                self.m5.tick();
                self.m15.tick();
            }
        }
    }
}

impl Metered for Meter {
    fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn mean_rate(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        let elapsed = self.clock.tick_nanos().saturating_sub(self.start_tick);
        if elapsed == 0 {
            return 0.0;
        }
        count as f64 / (elapsed as f64 / 1e9)
    }

    fn one_minute_rate(&self) -> f64 {
        self.tick_if_necessary();
        self.m1.rate()
    }

    fn five_minute_rate(&self) -> f64 {
        self.tick_if_necessary();
        self.m5.rate()
    }

    fn fifteen_minute_rate(&self) -> f64 {
        self.tick_if_necessary();
        self.m15.rate()
    }
}

/// Meter of calls plus a histogram of their durations, reported in milliseconds.
#[derive(Debug)]
pub struct Timer {
    meter: Meter,
    histogram: Histogram,
}

impl Timer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            meter: Meter::new(clock),
            histogram: Histogram::for_durations(),
        }
    }

    pub fn update(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.histogram.update(micros);
        self.meter.mark();
    }

    pub fn time<R>(&self, f: impl FnOnce() -> R) -> R {
        let ctx = self.context();
        let out = f();
        ctx.stop();
        out
    }

    /// Starts timing; the elapsed time is recorded when the context is stopped or dropped.
    pub fn context(&self) -> TimerContext<'_> {
        TimerContext {
            timer: self,
            start: self.meter.clock.tick_nanos(),
            stopped: false,
        }
    }
}

impl Metered for Timer {
    fn count(&self) -> u64 {
        self.meter.count()
    }

    fn mean_rate(&self) -> f64 {
        self.meter.mean_rate()
    }

    fn one_minute_rate(&self) -> f64 {
        self.meter.one_minute_rate()
    }

    fn five_minute_rate(&self) -> f64 {
        self.meter.five_minute_rate()
    }

    fn fifteen_minute_rate(&self) -> f64 {
        self.meter.fifteen_minute_rate()
    }
}

impl Summarizable for Timer {
    fn min(&self) -> f64 {
        self.histogram.min()
    }

    fn max(&self) -> f64 {
        self.histogram.max()
    }

    fn mean(&self) -> f64 {
        self.histogram.mean()
    }

    fn std_dev(&self) -> f64 {
        self.histogram.std_dev()
    }
}

impl Sampling for Timer {
    fn snapshot(&self) -> Snapshot {
        self.histogram.snapshot()
    }
}

pub struct TimerContext<'a> {
    timer: &'a Timer,
    start: u64,
    stopped: bool,
}

impl TimerContext<'_> {
    pub fn stop(mut self) -> Duration {
        self.record()
    }

    fn record(&mut self) -> Duration {
        self.stopped = true;
        let elapsed = self.timer.meter.clock.tick_nanos().saturating_sub(self.start);
        let elapsed = Duration::from_nanos(elapsed);
        self.timer.update(elapsed);
        elapsed
    }
}

impl Drop for TimerContext<'_> {
    fn drop(&mut self) {
        if !self.stopped {
            self.record();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(0))
    }

    #[test]
    fn counter_inc_dec_and_clear() {
        let c = Counter::default();
        c.inc();
        c.inc_by(4);
        c.dec();
        assert_eq!(c.count(), 4);
        c.dec_by(10);
        assert_eq!(c.count(), -6);
        c.clear();
        assert_eq!(c.count(), 0);
    }

    #[test]
    fn gauge_values_convert_to_numbers() {
        assert_eq!(GaugeValue::from(true).as_f64(), Some(1.0));
        assert_eq!(GaugeValue::from(false).as_f64(), Some(0.0));
        assert_eq!(GaugeValue::from(-3i32).as_f64(), Some(-3.0));
        assert_eq!(GaugeValue::from(7usize).as_f64(), Some(7.0));
        assert_eq!(GaugeValue::from(0.5f64).as_f64(), Some(0.5));
        assert_eq!(GaugeValue::from("idle").as_f64(), None);
    }

    #[test]
    fn gauge_reads_callback_each_time() {
        let source = Arc::new(AtomicI64::new(1));
        let g = {
            let source = source.clone();
            Gauge::new(move || source.load(Ordering::Relaxed))
        };
        assert_eq!(g.value().ok(), Some(GaugeValue::Int(1)));
        source.store(9, Ordering::Relaxed);
        assert_eq!(g.value().ok(), Some(GaugeValue::Int(9)));

        let failing = Gauge::fallible(|| Err::<i64, _>(GaugeError::new("sensor offline")));
        match failing.value() {
            Err(err) => assert_eq!(err.to_string(), "sensor offline"),
            Ok(v) => panic!("expected error, got {v:?}"),
        }
    }

    #[test]
    fn empty_histogram_reports_zeros() {
        let h = Histogram::default();
        assert_eq!(h.count(), 0);
        assert_eq!(h.min(), 0.0);
        assert_eq!(h.max(), 0.0);
        assert_eq!(h.mean(), 0.0);
        assert_eq!(h.std_dev(), 0.0);
        assert_eq!(h.snapshot().median(), 0.0);
    }

    #[test]
    fn histogram_summary_and_snapshot() {
        let h = Histogram::default();
        for v in 1..=100 {
            h.update(v);
        }

        assert_eq!(h.count(), 100);
        assert_eq!(h.min(), 1.0);
        assert_eq!(h.max(), 100.0);
        assert!((h.mean() - 50.5).abs() < 0.5);
        assert!(h.std_dev() > 0.0);

        let s = h.snapshot();
        assert_eq!(s.size(), 100);
        assert_eq!(s.median(), 50.0);
        assert_eq!(s.p75(), 75.0);
        assert_eq!(s.p99(), 99.0);
        assert_eq!(s.p999(), 100.0);
    }

    #[test]
    fn meter_counts_and_ticks_rates() {
        let clock = manual_clock();
        let meter = Meter::new(clock.clone());

        meter.mark_n(10);
        assert_eq!(meter.count(), 10);
        assert_eq!(meter.one_minute_rate(), 0.0);

        clock.advance(Duration::from_secs(6));
        assert!((meter.one_minute_rate() - 2.0).abs() < 1e-9);
        assert!((meter.five_minute_rate() - 2.0).abs() < 1e-9);
        assert!((meter.fifteen_minute_rate() - 2.0).abs() < 1e-9);
        assert!((meter.mean_rate() - 10.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn timer_records_durations_in_milliseconds() {
        let clock = manual_clock();
        let timer = Timer::new(clock.clone());

        timer.update(Duration::from_millis(20));
        {
            let _ctx = timer.context();
            clock.advance(Duration::from_millis(40));
        }

        assert_eq!(timer.count(), 2);
        assert!((timer.min() - 20.0).abs() < 0.1);
        assert!((timer.max() - 40.0).abs() < 0.1);
        assert!((timer.mean() - 30.0).abs() < 0.1);
        assert_eq!(timer.snapshot().size(), 2);
    }

    #[test]
    fn timer_time_returns_closure_output() {
        let timer = Timer::new(manual_clock());
        let out = timer.time(|| 5);
        assert_eq!(out, 5);
        assert_eq!(timer.count(), 1);
    }

    #[test]
    fn capabilities_follow_variant() {
        let clock: Arc<dyn Clock> = manual_clock();
        let counter = Metric::Counter(Arc::new(Counter::default()));
        let histogram = Metric::Histogram(Arc::new(Histogram::default()));
        let meter = Metric::Meter(Arc::new(Meter::new(clock.clone())));
        let timer = Metric::Timer(Arc::new(Timer::new(clock)));

        assert!(counter.as_metered().is_none());
        assert!(counter.as_summarizable().is_none());
        assert!(histogram.as_metered().is_none());
        assert!(histogram.as_summarizable().is_some());
        assert!(histogram.as_sampling().is_some());
        assert!(meter.as_metered().is_some());
        assert!(meter.as_sampling().is_none());
        assert!(timer.as_metered().is_some());
        assert!(timer.as_summarizable().is_some());
        assert!(timer.as_sampling().is_some());
        assert_eq!(timer.kind(), MetricKind::Timer);
        assert_eq!(MetricKind::Histogram.to_string(), "histogram");
    }
}
