use std::time::Duration;

use surge_metrics::{MetricId, MetricKind, Registry};

use crate::error::Result;

pub const ITERATIONS: &str = "iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const VUS: &str = "vus";
pub const VUS_MAX: &str = "vus_max";

#[derive(Debug, Clone, Copy)]
pub struct IterationMetricIds {
    pub iterations: MetricId,
    /// Iteration duration in milliseconds.
    pub iteration_duration: MetricId,
    pub vus: MetricId,
    pub vus_max: MetricId,
}

#[derive(Debug, Clone, Copy)]
pub struct IterationSample {
    pub success: bool,
    pub duration: Duration,
}

impl IterationMetricIds {
    pub fn register(metrics: &Registry) -> Result<Self> {
        Ok(Self {
            iterations: metrics.register(ITERATIONS, MetricKind::Counter)?,
            iteration_duration: metrics.register(ITERATION_DURATION, MetricKind::Trend)?,
            vus: metrics.register(VUS, MetricKind::Gauge)?,
            vus_max: metrics.register(VUS_MAX, MetricKind::Gauge)?,
        })
    }

    pub fn record_iteration(
        &self,
        metrics: &Registry,
        sample: IterationSample,
        base_tags: &[(&str, &str)],
    ) {
        let outcome = if sample.success { "success" } else { "failure" };

        let mut tags: Vec<(&str, &str)> = Vec::with_capacity(base_tags.len() + 1);
        tags.extend_from_slice(base_tags);
        tags.push(("outcome", outcome));
        let tags = metrics.resolve_tags(&tags);

        if let Some(h) = metrics.get_handle(self.iterations, tags.clone()) {
            h.increment(1);
        }
        if let Some(h) = metrics.get_handle(self.iteration_duration, tags) {
            h.observe(sample.duration.as_secs_f64() * 1_000.0);
        }
    }
}
