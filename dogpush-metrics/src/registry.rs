use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::metrics::{Counter, Gauge, Histogram, Meter, Metric, MetricKind, Timer};
use crate::name::MetricName;

/// Filter applied to metrics before they are handed out for reporting.
pub trait MetricPredicate: Send + Sync {
    fn matches(&self, name: &MetricName, metric: &Metric) -> bool;
}

impl<F> MetricPredicate for F
where
    F: Fn(&MetricName, &Metric) -> bool + Send + Sync,
{
    fn matches(&self, name: &MetricName, metric: &Metric) -> bool {
        self(name, metric)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllMetrics;

impl MetricPredicate for AllMetrics {
    fn matches(&self, _name: &MetricName, _metric: &Metric) -> bool {
        true
    }
}

#[derive(Debug)]
pub struct Registry {
    clock: Arc<dyn Clock>,
    metrics: DashMap<MetricName, Metric>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock::default()))
    }
}

impl Registry {
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            metrics: DashMap::new(),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn counter(&self, name: MetricName) -> Result<Arc<Counter>> {
        match self.get_or_insert(name, MetricKind::Counter, || {
            Metric::Counter(Arc::new(Counter::default()))
        })? {
            Metric::Counter(c) => Ok(c),
            _ => unreachable!("kind checked by get_or_insert"),
        }
    }

    /// Registers `gauge` under `name`; an existing gauge with that name is kept.
    pub fn gauge(&self, name: MetricName, gauge: Gauge) -> Result<Arc<Gauge>> {
        match self.get_or_insert(name, MetricKind::Gauge, || Metric::Gauge(Arc::new(gauge)))? {
            Metric::Gauge(g) => Ok(g),
            _ => unreachable!("kind checked by get_or_insert"),
        }
    }

    pub fn histogram(&self, name: MetricName) -> Result<Arc<Histogram>> {
        match self.get_or_insert(name, MetricKind::Histogram, || {
            Metric::Histogram(Arc::new(Histogram::default()))
        })? {
            Metric::Histogram(h) => Ok(h),
            _ => unreachable!("kind checked by get_or_insert"),
        }
    }

    pub fn meter(&self, name: MetricName) -> Result<Arc<Meter>> {
        let clock = self.clock.clone();
        match self.get_or_insert(name, MetricKind::Meter, || {
            Metric::Meter(Arc::new(Meter::new(clock)))
        })? {
            Metric::Meter(m) => Ok(m),
            _ => unreachable!("kind checked by get_or_insert"),
        }
    }

    pub fn timer(&self, name: MetricName) -> Result<Arc<Timer>> {
        let clock = self.clock.clone();
        match self.get_or_insert(name, MetricKind::Timer, || {
            Metric::Timer(Arc::new(Timer::new(clock)))
        })? {
            Metric::Timer(t) => Ok(t),
            _ => unreachable!("kind checked by get_or_insert"),
        }
    }

    fn get_or_insert(
        &self,
        name: MetricName,
        kind: MetricKind,
        create: impl FnOnce() -> Metric,
    ) -> Result<Metric> {
        match self.metrics.entry(name) {
            Entry::Occupied(e) => {
                let existing = e.get().kind();
                if existing != kind {
                    return Err(Error::KindMismatch {
                        name: e.key().to_string(),
                        existing,
                        requested: kind,
                    });
                }
                Ok(e.get().clone())
            }
            Entry::Vacant(e) => Ok(e.insert(create()).clone()),
        }
    }

    pub fn remove(&self, name: &MetricName) -> Option<Metric> {
        self.metrics.remove(name).map(|(_, m)| m)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Metrics accepted by `predicate`, grouped by [`MetricName::group_key`].
    ///
    /// Both levels are sorted. The result is a copy of the handles at the time of
    /// the call; metrics registered or removed afterwards are not reflected.
    pub fn grouped_metrics(
        &self,
        predicate: &dyn MetricPredicate,
    ) -> BTreeMap<String, BTreeMap<MetricName, Metric>> {
        // The predicate runs with no shard locked, so it may use the registry.
        let snapshot: Vec<(MetricName, Metric)> = self
            .metrics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut out: BTreeMap<String, BTreeMap<MetricName, Metric>> = BTreeMap::new();
        for (name, metric) in snapshot {
            if predicate.matches(&name, &metric) {
                out.entry(name.group_key()).or_default().insert(name, metric);
            }
        }
        out
    }
}
