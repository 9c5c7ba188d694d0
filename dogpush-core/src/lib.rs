pub mod config;
mod error;
pub mod reporter;
pub mod runtime;
pub mod sanitize;
mod scheduler;
pub mod series;
pub mod transport;
mod visitor;

pub use config::{HostDiscovery, ReporterConfig};
pub use error::{Error, Result};
pub use reporter::{DatadogReporter, PassOutcome, PassReport, PassStage};
pub use runtime::{GcStats, ProcessRuntimeStats, RuntimeSnapshot, RuntimeStats};
pub use sanitize::sanitize_name;
pub use scheduler::ReporterHandle;
pub use series::{DataPoint, SeriesKind, SeriesStats, SeriesWriter};
pub use transport::{Request, Transport, WriterRequest, WriterTransport};
