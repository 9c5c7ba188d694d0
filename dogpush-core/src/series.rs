//! Incremental writer for the `{"series": [...]}` payload.
//!
//! Points are serialized one at a time straight into the request body. Each
//! record is rendered into a scratch buffer first, so a point that fails to
//! serialize is dropped whole and never leaves a half-written record behind.

use std::io::Write;

use dogpush_metrics::MetricName;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::sanitize::sanitize_name;

const PROLOGUE: &[u8] = b"{\"series\":[";
const EPILOGUE: &[u8] = b"]}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SeriesKind {
    Counter,
    Gauge,
}

/// One wire record: `{"metric", "points": [[epoch, value]], "type", "host"}`.
///
/// Values are always written as JSON floating-point numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint<'a> {
    pub metric: &'a str,
    pub points: [(u64, f64); 1],
    #[serde(rename = "type")]
    pub kind: SeriesKind,
    pub host: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeriesStats {
    pub written: u64,
    pub failed: u64,
}

pub struct SeriesWriter<'a, W: Write> {
    out: &'a mut W,
    epoch: u64,
    host: Option<&'a str>,
    first: bool,
    scratch: Vec<u8>,
    stats: SeriesStats,
}

impl<'a, W: Write> SeriesWriter<'a, W> {
    /// Writes the payload prologue. Every point written afterwards carries `epoch`.
    pub fn open(out: &'a mut W, epoch: u64, host: Option<&'a str>) -> Result<Self> {
        out.write_all(PROLOGUE)?;
        Ok(Self {
            out,
            epoch,
            host,
            first: true,
            scratch: Vec::with_capacity(256),
            stats: SeriesStats::default(),
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn stats(&self) -> SeriesStats {
        self.stats
    }

    pub fn counter(&mut self, metric: &str, count: f64) {
        self.push(metric, count, SeriesKind::Counter);
    }

    pub fn gauge(&mut self, metric: &str, value: f64) {
        self.push(metric, value, SeriesKind::Gauge);
    }

    pub fn counter_for(&mut self, name: &MetricName, path: &[&str], count: f64) {
        let metric = sanitize_name(name, path);
        self.counter(&metric, count);
    }

    pub fn gauge_for(&mut self, name: &MetricName, path: &[&str], value: f64) {
        let metric = sanitize_name(name, path);
        self.gauge(&metric, value);
    }

    fn push(&mut self, metric: &str, value: f64, kind: SeriesKind) {
        let point = DataPoint {
            metric,
            points: [(self.epoch, value)],
            kind,
            host: self.host,
        };

        match self.try_push(&point) {
            Ok(()) => self.stats.written += 1,
            Err(err) => {
                self.stats.failed += 1;
                tracing::error!(metric, error = %err, "Error writing {kind}");
            }
        }
    }

    fn try_push(&mut self, point: &DataPoint<'_>) -> Result<()> {
        let value = point.points[0].1;
        if !value.is_finite() {
            // serde_json would silently turn these into `null`.
            return Err(Error::NonFiniteValue {
                metric: point.metric.to_string(),
                value,
            });
        }

        self.scratch.clear();
        if !self.first {
            self.scratch.push(b',');
        }
        serde_json::to_writer(&mut self.scratch, point).map_err(|source| Error::Serialize {
            metric: point.metric.to_string(),
            source,
        })?;

        self.out.write_all(&self.scratch)?;
        self.first = false;
        Ok(())
    }

    /// Writes the epilogue and flushes the underlying stream.
    pub fn close(self) -> Result<SeriesStats> {
        self.out.write_all(EPILOGUE)?;
        self.out.flush()?;
        Ok(self.stats)
    }
}
