use std::sync::Arc;

use dogpush_core::{Request, Transport};
use dogpush_metrics::{Counter, MetricName, Registry, Timer};

/// Handles to the agent's own delivery metrics, reported under `dogpush.Transport`.
#[derive(Debug, Clone)]
pub struct TransportMetrics {
    sends: Arc<Counter>,
    failures: Arc<Counter>,
    latency: Arc<Timer>,
}

impl TransportMetrics {
    pub fn register(registry: &Registry) -> dogpush_metrics::Result<Self> {
        let name = |n: &str| MetricName::new("dogpush", "Transport", n);
        Ok(Self {
            sends: registry.counter(name("sends")?)?,
            failures: registry.counter(name("send_failures")?)?,
            latency: registry.timer(name("send_latency")?)?,
        })
    }
}

/// Wraps a transport, counting sends and timing each one.
#[derive(Debug)]
pub struct InstrumentedTransport<T> {
    inner: T,
    metrics: TransportMetrics,
}

impl<T: Transport> InstrumentedTransport<T> {
    pub fn new(inner: T, metrics: TransportMetrics) -> Self {
        Self { inner, metrics }
    }
}

impl<T: Transport> Transport for InstrumentedTransport<T> {
    type Request = InstrumentedRequest<T::Request>;

    fn prepare(&self) -> dogpush_core::Result<Self::Request> {
        Ok(InstrumentedRequest {
            inner: self.inner.prepare()?,
            metrics: self.metrics.clone(),
        })
    }
}

pub struct InstrumentedRequest<R> {
    inner: R,
    metrics: TransportMetrics,
}

impl<R: Request> Request for InstrumentedRequest<R> {
    type Writer = R::Writer;

    fn body_writer(&mut self) -> &mut R::Writer {
        self.inner.body_writer()
    }

    async fn send(self) -> dogpush_core::Result<()> {
        let Self { inner, metrics } = self;
        let started = std::time::Instant::now();
        let res = inner.send().await;
        metrics.latency.update(started.elapsed());
        metrics.sends.inc();
        if res.is_err() {
            metrics.failures.inc();
        }
        res
    }
}
