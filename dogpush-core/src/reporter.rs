use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use dogpush_metrics::{AllMetrics, Clock, MetricPredicate, Registry, SystemClock};

use crate::runtime::{RuntimeSnapshot, RuntimeStats};
use crate::series::{SeriesStats, SeriesWriter};
use crate::transport::{Request, Transport};
use crate::visitor::process_metric;

/// Where a failed pass stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum PassStage {
    /// No request could be prepared or the payload could not be started.
    Opening,
    /// The payload could not be terminated or flushed.
    Closing,
    /// The transport rejected the finished payload.
    Sending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Sent,
    Failed(PassStage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub outcome: PassOutcome,
    /// Epoch seconds shared by every point of the pass.
    pub epoch: u64,
    pub points: SeriesStats,
    pub metric_failures: u64,
}

impl PassReport {
    fn failed(stage: PassStage, epoch: u64) -> Self {
        Self {
            outcome: PassOutcome::Failed(stage),
            epoch,
            points: SeriesStats::default(),
            metric_failures: 0,
        }
    }

    pub fn is_sent(&self) -> bool {
        self.outcome == PassOutcome::Sent
    }
}

/// Streams the registry (and optionally runtime statistics) to a transport.
///
/// Each call to [`DatadogReporter::run`] is one pass. Passes must not overlap;
/// [`DatadogReporter::start`] takes care of that when scheduling them.
pub struct DatadogReporter<T> {
    registry: Arc<Registry>,
    predicate: Arc<dyn MetricPredicate>,
    runtime: Option<Arc<dyn RuntimeStats>>,
    transport: T,
    clock: Arc<dyn Clock>,
    host: Option<String>,
}

impl<T: Transport> DatadogReporter<T> {
    pub fn new(registry: Arc<Registry>, transport: T) -> Self {
        Self {
            registry,
            predicate: Arc::new(AllMetrics),
            runtime: None,
            transport,
            clock: Arc::new(SystemClock::default()),
            host: None,
        }
    }

    #[must_use]
    pub fn with_predicate(mut self, predicate: Arc<dyn MetricPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    /// Enables runtime statistics reporting from `runtime`.
    #[must_use]
    pub fn with_runtime_stats(mut self, runtime: Arc<dyn RuntimeStats>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: Option<String>) -> Self {
        self.host = host;
        self
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Runs one reporting pass. Failures are logged and reflected in the
    /// returned report, never returned as errors.
    pub async fn run(&self) -> PassReport {
        let epoch = self.clock.time_millis() / 1000;

        let mut request = match self.transport.prepare() {
            Ok(r) => r,
            Err(err) => {
                tracing::error!(error = %err, "Could not prepare request");
                return PassReport::failed(PassStage::Opening, epoch);
            }
        };

        let (points, metric_failures) = match self.stream(request.body_writer(), epoch) {
            Ok(v) => v,
            Err(report) => return report,
        };

        if let Err(err) = request.send().await {
            tracing::error!(error = %err, "Error sending metrics");
            return PassReport {
                outcome: PassOutcome::Failed(PassStage::Sending),
                epoch,
                points,
                metric_failures,
            };
        }

        tracing::debug!(
            epoch,
            written = points.written,
            failed_points = points.failed,
            metric_failures,
            "metrics sent"
        );
        PassReport {
            outcome: PassOutcome::Sent,
            epoch,
            points,
            metric_failures,
        }
    }

    fn stream<W: Write>(
        &self,
        out: &mut W,
        epoch: u64,
    ) -> Result<(SeriesStats, u64), PassReport> {
        let mut series = match SeriesWriter::open(out, epoch, self.host.as_deref()) {
            Ok(s) => s,
            Err(err) => {
                tracing::error!(error = %err, "Could not prepare request");
                return Err(PassReport::failed(PassStage::Opening, epoch));
            }
        };

        if let Some(runtime) = &self.runtime {
            push_runtime_metrics(&mut series, &runtime.snapshot());
        }
        let metric_failures = self.push_regular_metrics(&mut series);

        let partial = series.stats();
        match series.close() {
            Ok(points) => Ok((points, metric_failures)),
            Err(err) => {
                tracing::error!(error = %err, "Error sending metrics");
                Err(PassReport {
                    outcome: PassOutcome::Failed(PassStage::Closing),
                    epoch,
                    points: partial,
                    metric_failures,
                })
            }
        }
    }

    fn push_regular_metrics<W: Write>(&self, series: &mut SeriesWriter<'_, W>) -> u64 {
        let mut failures = 0;
        for group in self.registry.grouped_metrics(self.predicate.as_ref()).into_values() {
            for (name, metric) in group {
                // Gauge callbacks are user code; a panic in one must not lose the pass.
                match catch_unwind(AssertUnwindSafe(|| process_metric(series, &name, &metric))) {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        failures += 1;
                        tracing::error!(metric = %name, error = %err, "Error pushing metric");
                    }
                    Err(_) => {
                        failures += 1;
                        tracing::error!(metric = %name, "Error pushing metric: panicked");
                    }
                }
            }
        }
        failures
    }
}

fn push_runtime_metrics<W: Write>(series: &mut SeriesWriter<'_, W>, vm: &RuntimeSnapshot) {
    series.gauge("jvm.memory.heap_usage", vm.heap_usage);
    series.gauge("jvm.memory.non_heap_usage", vm.non_heap_usage);
    for (pool, usage) in &vm.memory_pool_usage {
        series.gauge(&format!("jvm.memory.memory_pool_usage[pool:{pool}]"), *usage);
    }

    series.gauge("jvm.daemon_thread_count", vm.daemon_thread_count as f64);
    series.gauge("jvm.thread_count", vm.thread_count as f64);
    series.counter("jvm.uptime", vm.uptime.as_secs() as f64);
    series.gauge("jvm.fd_usage", vm.fd_usage);

    for (state, pct) in &vm.thread_state_percentages {
        series.gauge(&format!("jvm.thread-states[state:{state}]"), *pct);
    }

    for (gc, stats) in &vm.garbage_collectors {
        series.gauge(&format!("jvm.gc.time[gc:{gc}]"), stats.time.as_millis() as f64);
        series.counter(&format!("jvm.gc.runs[gc:{gc}]"), stats.runs as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::runtime::GcStats;
    use crate::transport::WriterTransport;
    use dogpush_metrics::{Gauge, ManualClock, Metric, MetricKind, MetricName};
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn name(group: &str, type_: &str, n: &str) -> MetricName {
        MetricName::new(group, type_, n).unwrap_or_else(|e| panic!("valid name: {e}"))
    }

    fn capture() -> (WriterTransport, Arc<Mutex<Vec<Vec<u8>>>>) {
        let seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::default();
        let transport = {
            let seen = seen.clone();
            WriterTransport::new(move |body| {
                seen.lock().push(body);
                Ok(())
            })
        };
        (transport, seen)
    }

    fn series(payload: &[u8]) -> Vec<Value> {
        let v: Value = serde_json::from_slice(payload).unwrap_or_else(|e| panic!("json: {e}"));
        v["series"].as_array().cloned().unwrap_or_default()
    }

    fn metric_names(points: &[Value]) -> Vec<&str> {
        points.iter().filter_map(|p| p["metric"].as_str()).collect()
    }

    #[tokio::test]
    async fn single_counter_end_to_end() {
        let registry = Arc::new(Registry::default());
        registry
            .counter(name("web", "Hits", "total"))
            .unwrap_or_else(|e| panic!("{e}"))
            .inc_by(42);

        let (transport, seen) = capture();
        let reporter = DatadogReporter::new(registry, transport).with_host(Some("h1".into()));
        let report = reporter.run().await;
        assert!(report.is_sent());
        assert_eq!(report.points, SeriesStats { written: 1, failed: 0 });

        let payloads = seen.lock();
        assert_eq!(payloads.len(), 1);
        let points = series(&payloads[0]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0]["metric"], "web.Hits.total");
        assert_eq!(points[0]["points"][0][1].as_f64(), Some(42.0));
        assert_eq!(points[0]["host"], "h1");
    }

    #[tokio::test]
    async fn all_points_share_the_pass_timestamp() {
        let clock = Arc::new(ManualClock::new(1_700_000_123_456));
        let registry = Arc::new(Registry::with_clock(clock.clone()));
        registry
            .timer(name("web", "Req", "latency"))
            .unwrap_or_else(|e| panic!("{e}"))
            .update(Duration::from_millis(3));
        registry
            .counter(name("web", "Req", "count"))
            .unwrap_or_else(|e| panic!("{e}"))
            .inc();

        let (transport, seen) = capture();
        let reporter = DatadogReporter::new(registry, transport)
            .with_clock(clock)
            .with_runtime_stats(Arc::new(RuntimeSnapshot::default()));
        let report = reporter.run().await;
        assert_eq!(report.epoch, 1_700_000_123);

        let payloads = seen.lock();
        let points = series(&payloads[0]);
        assert!(points.len() > 16);
        assert!(
            points
                .iter()
                .all(|p| p["points"][0][0].as_u64() == Some(1_700_000_123))
        );
    }

    #[tokio::test]
    async fn runtime_metrics_use_literal_tagged_names() {
        let snapshot = RuntimeSnapshot {
            heap_usage: 0.5,
            non_heap_usage: 0.1,
            memory_pool_usage: BTreeMap::from([("swap".to_string(), 0.2)]),
            daemon_thread_count: 3,
            thread_count: 4,
            uptime: Duration::from_secs(90),
            fd_usage: 0.01,
            thread_state_percentages: BTreeMap::from([("RUNNABLE".to_string(), 1.0)]),
            garbage_collectors: BTreeMap::from([(
                "young".to_string(),
                GcStats {
                    time: Duration::from_millis(12),
                    runs: 2,
                },
            )]),
        };

        let (transport, seen) = capture();
        let reporter = DatadogReporter::new(Arc::new(Registry::default()), transport)
            .with_runtime_stats(Arc::new(snapshot));
        assert!(reporter.run().await.is_sent());

        let payloads = seen.lock();
        let points = series(&payloads[0]);
        assert_eq!(
            metric_names(&points),
            vec![
                "jvm.memory.heap_usage",
                "jvm.memory.non_heap_usage",
                "jvm.memory.memory_pool_usage[pool:swap]",
                "jvm.daemon_thread_count",
                "jvm.thread_count",
                "jvm.uptime",
                "jvm.fd_usage",
                "jvm.thread-states[state:RUNNABLE]",
                "jvm.gc.time[gc:young]",
                "jvm.gc.runs[gc:young]",
            ]
        );
        assert_eq!(points[5]["type"], "counter");
        assert_eq!(points[5]["points"][0][1].as_f64(), Some(90.0));
        assert_eq!(points[8]["points"][0][1].as_f64(), Some(12.0));
    }

    #[tokio::test]
    async fn failing_and_panicking_gauges_do_not_stop_the_pass() {
        let registry = Arc::new(Registry::default());
        let gauges = [
            ("a_ok", Gauge::new(|| 1)),
            (
                "b_err",
                Gauge::fallible(|| Err::<i64, _>(dogpush_metrics::GaugeError::new("nope"))),
            ),
            ("c_panic", Gauge::new(|| -> i64 { panic!("gauge exploded") })),
            ("d_nan", Gauge::new(|| f64::NAN)),
            ("e_ok", Gauge::new(|| 5)),
        ];
        for (n, g) in gauges {
            if let Err(e) = registry.gauge(name("g", "T", n), g) {
                panic!("{e}");
            }
        }

        let (transport, seen) = capture();
        let report = DatadogReporter::new(registry, transport).run().await;
        assert!(report.is_sent());
        assert_eq!(report.metric_failures, 2);
        assert_eq!(report.points, SeriesStats { written: 2, failed: 1 });

        let payloads = seen.lock();
        assert_eq!(metric_names(&series(&payloads[0])), vec!["g.T.a_ok", "g.T.e_ok"]);
    }

    #[tokio::test]
    async fn predicate_filters_metrics() {
        let registry = Arc::new(Registry::default());
        for n in ["kept", "dropped"] {
            if let Err(e) = registry.counter(name("g", "T", n)) {
                panic!("{e}");
            }
        }
        if let Err(e) = registry.histogram(name("g", "T", "sizes")) {
            panic!("{e}");
        }

        let predicate = |n: &MetricName, m: &Metric| -> bool {
            n.name() != "dropped" && m.kind() == MetricKind::Counter
        };
        let (transport, seen) = capture();
        let reporter = DatadogReporter::new(registry, transport).with_predicate(Arc::new(predicate));
        assert!(reporter.run().await.is_sent());

        let payloads = seen.lock();
        assert_eq!(metric_names(&series(&payloads[0])), vec!["g.T.kept"]);
    }

    struct FailingPrepare;

    impl Transport for FailingPrepare {
        type Request = crate::transport::WriterRequest;

        fn prepare(&self) -> Result<Self::Request> {
            Err(Error::transport(std::io::Error::other("no connection")))
        }
    }

    #[tokio::test]
    async fn prepare_failure_aborts_the_pass() {
        let report = DatadogReporter::new(Arc::new(Registry::default()), FailingPrepare)
            .run()
            .await;
        assert_eq!(report.outcome, PassOutcome::Failed(PassStage::Opening));
        assert_eq!(report.points, SeriesStats::default());
    }

    /// Body accepts `writes_left` writes, then fails.
    struct FailAfter {
        writes_left: usize,
        sends: Arc<Mutex<u32>>,
    }

    struct FailAfterRequest {
        body: FailAfterWriter,
        sends: Arc<Mutex<u32>>,
    }

    struct FailAfterWriter {
        inner: Vec<u8>,
        writes_left: usize,
    }

    impl Write for FailAfterWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.writes_left == 0 {
                return Err(std::io::Error::other("disk full"));
            }
            self.writes_left -= 1;
            self.inner.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Transport for FailAfter {
        type Request = FailAfterRequest;

        fn prepare(&self) -> Result<Self::Request> {
            Ok(FailAfterRequest {
                body: FailAfterWriter {
                    inner: Vec::new(),
                    writes_left: self.writes_left,
                },
                sends: self.sends.clone(),
            })
        }
    }

    impl Request for FailAfterRequest {
        type Writer = FailAfterWriter;

        fn body_writer(&mut self) -> &mut Self::Writer {
            &mut self.body
        }

        async fn send(self) -> Result<()> {
            *self.sends.lock() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn epilogue_failure_is_a_closing_failure_and_nothing_is_sent() {
        let registry = Arc::new(Registry::default());
        registry
            .counter(name("web", "Hits", "total"))
            .unwrap_or_else(|e| panic!("{e}"))
            .inc();

        let sends = Arc::new(Mutex::new(0u32));
        // prologue and the single point go through; the epilogue does not
        let transport = FailAfter {
            writes_left: 2,
            sends: sends.clone(),
        };

        let report = DatadogReporter::new(registry, transport).run().await;
        assert_eq!(report.outcome, PassOutcome::Failed(PassStage::Closing));
        assert_eq!(report.points, SeriesStats { written: 1, failed: 0 });
        assert_eq!(*sends.lock(), 0);
    }

    #[tokio::test]
    async fn send_failure_is_reported_and_next_pass_still_runs() {
        let attempts = Arc::new(Mutex::new(0u32));
        let transport = {
            let attempts = attempts.clone();
            WriterTransport::new(move |_| {
                let mut n = attempts.lock();
                *n += 1;
                if *n == 1 {
                    Err(std::io::Error::other("503"))
                } else {
                    Ok(())
                }
            })
        };

        let reporter = DatadogReporter::new(Arc::new(Registry::default()), transport);
        assert_eq!(
            reporter.run().await.outcome,
            PassOutcome::Failed(PassStage::Sending)
        );
        assert!(reporter.run().await.is_sent());
        assert_eq!(*attempts.lock(), 2);
    }
}
