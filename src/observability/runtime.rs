//! Runtime metric catalogue.
//!
//! Each entry pairs a path-style name (`/server/connections/active:connections`)
//! with a sampler closure. Samplers only read current values; the periodic
//! task in [`spawn_sampler`] decides when they run.
//!
//! Name mapping:
//! ```text
//! /server/connections/active:connections
//!     → server_connections_active_connections
//!     labels: namespace=server subsystem=connections units=connections
//! ```

use std::time::Duration;

use metrics::Label;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;

use crate::lifecycle::Context;

type Sampler = Box<dyn Fn() -> f64 + Send + Sync>;

/// Labels derived from a runtime metric path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLabels {
    pub namespace: String,
    pub subsystem: String,
    pub units: String,
}

/// Convert a path-style name into a Prometheus-safe metric name.
pub fn normalize_metric_name(name: &str) -> String {
    name.replacen('/', "", 1)
        .replace([':', '/', '-'], "_")
        .trim()
        .to_string()
}

/// Derive labels from a path-style name. `None` for names without a
/// namespace segment.
pub fn metric_labels(name: &str) -> Option<MetricLabels> {
    let segments: Vec<&str> = name.split('/').collect();
    if segments.len() < 2 || segments[1].is_empty() {
        return None;
    }
    let namespace = segments[1];
    let last = segments[segments.len() - 1];
    let units = last.split_once(':').map(|(_, units)| units).unwrap_or("");
    let subsystem = if segments.len() > 3 {
        segments[2]
    } else {
        namespace
    };

    Some(MetricLabels {
        namespace: namespace.to_string(),
        subsystem: subsystem.to_string(),
        units: units.to_string(),
    })
}

/// One sampled metric.
pub struct RuntimeMetric {
    path: &'static str,
    key: String,
    labels: Vec<Label>,
    description: &'static str,
    cumulative: bool,
    sample: Sampler,
}

impl RuntimeMetric {
    fn new<F>(path: &'static str, description: &'static str, cumulative: bool, sample: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        let labels = metric_labels(path)
            .map(|l| {
                vec![
                    Label::new("namespace", l.namespace),
                    Label::new("subsystem", l.subsystem),
                    Label::new("units", l.units),
                ]
            })
            .unwrap_or_default();

        Self {
            path,
            key: normalize_metric_name(path),
            labels,
            description,
            cumulative,
            sample: Box::new(sample),
        }
    }

    /// A point-in-time value, exported as a gauge.
    pub fn gauge<F>(path: &'static str, description: &'static str, sample: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        Self::new(path, description, false, sample)
    }

    /// A monotonically increasing total, exported as a counter.
    pub fn cumulative<F>(path: &'static str, description: &'static str, sample: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        Self::new(path, description, true, sample)
    }

    pub fn path(&self) -> &str {
        self.path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_cumulative(&self) -> bool {
        self.cumulative
    }

    /// Current value.
    pub fn sample(&self) -> f64 {
        (self.sample)()
    }

    fn describe(&self) {
        if self.cumulative {
            metrics::describe_counter!(self.key.clone(), self.description);
        } else {
            metrics::describe_gauge!(self.key.clone(), self.description);
        }
    }

    fn record(&self) {
        let value = self.sample();
        if self.cumulative {
            metrics::counter!(self.key.clone(), self.labels.clone()).absolute(value as u64);
        } else {
            metrics::gauge!(self.key.clone(), self.labels.clone()).set(value);
        }
    }
}

/// The set of runtime metrics sampled together.
#[derive(Default)]
pub struct RuntimeCatalogue {
    metrics: Vec<RuntimeMetric>,
}

impl RuntimeCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, metric: RuntimeMetric) -> Self {
        self.metrics.push(metric);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuntimeMetric> {
        self.metrics.iter()
    }

    /// Register descriptions with the installed recorder.
    pub fn describe(&self) {
        for metric in &self.metrics {
            metric.describe();
        }
    }

    /// Sample every metric once.
    pub fn record(&self) {
        for metric in &self.metrics {
            metric.record();
        }
    }
}

/// Sample `catalogue` every `interval` until `ctx` is done.
///
/// A final sample is taken after cancellation so the last scrape during the
/// settle interval sees shutdown-time values.
pub fn spawn_sampler(
    catalogue: RuntimeCatalogue,
    interval: Duration,
    ctx: Context,
    handle: Option<PrometheusHandle>,
) -> JoinHandle<()> {
    catalogue.describe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                _ = ticker.tick() => {
                    catalogue.record();
                    if let Some(handle) = &handle {
                        handle.run_upkeep();
                    }
                }
            }
        }
        catalogue.record();
        tracing::debug!("Runtime metric sampler stopped");
    })
}
