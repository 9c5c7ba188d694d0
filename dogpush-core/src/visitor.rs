use std::io::Write;

use dogpush_metrics::{Metered, Metric, MetricName, Sampling, Summarizable};

use crate::error::{Error, Result};
use crate::series::SeriesWriter;

/// Expands one metric into its data points.
///
/// Counters and gauges are reported as a single point. Everything else is
/// expanded by capability, in order: metered, summary, quantiles.
pub(crate) fn process_metric<W: Write>(
    series: &mut SeriesWriter<'_, W>,
    name: &MetricName,
    metric: &Metric,
) -> Result<()> {
    match metric {
        Metric::Counter(counter) => series.counter_for(name, &[], counter.count() as f64),
        Metric::Gauge(gauge) => {
            let value = gauge.value().map_err(|source| Error::Gauge {
                metric: name.to_string(),
                source,
            })?;
            // Text gauges have no numeric form and are skipped.
            if let Some(v) = value.as_f64() {
                series.gauge_for(name, &[], v);
            }
        }
        Metric::Histogram(_) | Metric::Meter(_) | Metric::Timer(_) => {}
    }

    if let Some(metered) = metric.as_metered() {
        push_metered(series, name, metered);
    }
    if let Some(summarizable) = metric.as_summarizable() {
        push_summarizable(series, name, summarizable);
    }
    if let Some(sampling) = metric.as_sampling() {
        push_sampling(series, name, sampling);
    }
    Ok(())
}

fn push_metered<W: Write>(series: &mut SeriesWriter<'_, W>, name: &MetricName, m: &dyn Metered) {
    series.counter_for(name, &[], m.count() as f64);
    series.gauge_for(name, &["mean"], m.mean_rate());
    series.gauge_for(name, &["1MinuteRate"], m.one_minute_rate());
    series.gauge_for(name, &["5MinuteRate"], m.five_minute_rate());
    series.gauge_for(name, &["15MinuteRate"], m.fifteen_minute_rate());
}

fn push_summarizable<W: Write>(
    series: &mut SeriesWriter<'_, W>,
    name: &MetricName,
    s: &dyn Summarizable,
) {
    series.gauge_for(name, &["min"], s.min());
    series.gauge_for(name, &["max"], s.max());
    series.gauge_for(name, &["mean"], s.mean());
    series.gauge_for(name, &["stddev"], s.std_dev());
}

fn push_sampling<W: Write>(series: &mut SeriesWriter<'_, W>, name: &MetricName, s: &dyn Sampling) {
    let snapshot = s.snapshot();
    series.gauge_for(name, &["median"], snapshot.median());
    series.gauge_for(name, &["75percentile"], snapshot.p75());
    series.gauge_for(name, &["95percentile"], snapshot.p95());
    series.gauge_for(name, &["98percentile"], snapshot.p98());
    series.gauge_for(name, &["99percentile"], snapshot.p99());
    series.gauge_for(name, &["999percentile"], snapshot.p999());
}
