pub mod clock;
pub mod error;
mod ewma;
pub mod metrics;
pub mod name;
pub mod registry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use metrics::{
    Counter, Gauge, GaugeError, GaugeValue, Histogram, Meter, Metered, Metric, MetricKind,
    Sampling, Snapshot, Summarizable, Timer, TimerContext,
};
pub use name::MetricName;
pub use registry::{AllMetrics, MetricPredicate, Registry};
