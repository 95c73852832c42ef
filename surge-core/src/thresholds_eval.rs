use std::time::Duration;

use surge_metrics::{MetricId, MetricKind, Registry};

use crate::error::{Error, Result};
use crate::thresholds::{Evaluation, ThresholdAgg, ThresholdDef, ThresholdSet};

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub selector: String,
    pub expression: String,
    pub evaluation: Evaluation,
    /// `None` when the metric has no samples matching the selector.
    pub observed: Option<f64>,
    pub passed: bool,
}

fn aggregate_supported(kind: MetricKind, agg: ThresholdAgg) -> bool {
    match kind {
        MetricKind::Counter => matches!(agg, ThresholdAgg::Count | ThresholdAgg::Rate),
        MetricKind::Gauge => matches!(agg, ThresholdAgg::Value | ThresholdAgg::Max),
        MetricKind::Rate => matches!(agg, ThresholdAgg::Rate | ThresholdAgg::Count),
        MetricKind::Trend => matches!(
            agg,
            ThresholdAgg::Avg
                | ThresholdAgg::Min
                | ThresholdAgg::Max
                | ThresholdAgg::Med
                | ThresholdAgg::Count
                | ThresholdAgg::P(_)
        ),
    }
}

/// Reject thresholds on unknown metrics and aggregates the metric's kind cannot answer.
pub fn validate_thresholds(metrics: &Registry, sets: &[ThresholdSet]) -> Result<()> {
    for set in sets {
        let Some((_, kind)) = metrics.lookup_metric(&set.metric.metric) else {
            return Err(Error::Threshold {
                selector: set.selector.clone(),
                expression: String::new(),
                reason: format!("unknown metric `{}`", set.metric.metric),
            });
        };
        for def in &set.thresholds {
            if !aggregate_supported(kind, def.parsed.agg) {
                return Err(Error::Threshold {
                    selector: set.selector.clone(),
                    expression: def.expression.clone(),
                    reason: format!("`{}` is not supported on a {kind} metric", def.parsed.agg),
                });
            }
        }
    }
    Ok(())
}

/// Evaluate every threshold `include` accepts. `elapsed` turns counters into per-second rates.
pub fn evaluate_thresholds(
    metrics: &Registry,
    sets: &[ThresholdSet],
    elapsed: Duration,
    include: impl Fn(&ThresholdDef) -> bool,
) -> Vec<ThresholdOutcome> {
    let mut out = Vec::new();

    for set in sets {
        let lookup = metrics.lookup_metric(&set.metric.metric);
        for def in set.thresholds.iter().filter(|d| include(d)) {
            let observed = lookup.and_then(|(id, kind)| {
                observed_value(metrics, id, kind, &set.metric.tags, def.parsed.agg, elapsed)
            });
            let passed = observed.is_some_and(|v| def.parsed.op.compare(v, def.parsed.value));
            out.push(ThresholdOutcome {
                selector: set.selector.clone(),
                expression: def.expression.clone(),
                evaluation: def.evaluation,
                observed,
                passed,
            });
        }
    }

    out
}

pub fn evaluate_all(metrics: &Registry, sets: &[ThresholdSet], elapsed: Duration) -> Vec<ThresholdOutcome> {
    evaluate_thresholds(metrics, sets, elapsed, |_| true)
}

pub fn evaluate_continuous(
    metrics: &Registry,
    sets: &[ThresholdSet],
    elapsed: Duration,
) -> Vec<ThresholdOutcome> {
    evaluate_thresholds(metrics, sets, elapsed, |d| {
        d.evaluation == Evaluation::Continuous
    })
}

fn observed_value(
    metrics: &Registry,
    metric: MetricId,
    kind: MetricKind,
    tags: &[(String, String)],
    agg: ThresholdAgg,
    elapsed: Duration,
) -> Option<f64> {
    let query = metrics.query(metric).where_tags(tags);
    match kind {
        MetricKind::Counter => {
            let total = query.sum_counter()?;
            match agg {
                ThresholdAgg::Count => Some(total as f64),
                ThresholdAgg::Rate => {
                    let secs = elapsed.as_secs_f64();
                    (secs > 0.0).then(|| total as f64 / secs)
                }
                _ => None,
            }
        }
        MetricKind::Gauge => {
            // No matching series means the gauge was never set.
            let max = metrics.query(metric).where_tags(tags).gauge_max()?;
            match agg {
                ThresholdAgg::Max => Some(max as f64),
                ThresholdAgg::Value => Some(query.gauge_sum() as f64),
                _ => None,
            }
        }
        MetricKind::Rate => {
            let totals = query.sum_rate();
            if totals.total == 0 {
                return None;
            }
            match agg {
                ThresholdAgg::Rate => totals.rate(),
                ThresholdAgg::Count => Some(totals.total as f64),
                _ => None,
            }
        }
        MetricKind::Trend => {
            let mut samples = query.merge_trend();
            if samples.is_empty() {
                return None;
            }
            match agg {
                ThresholdAgg::P(p) => samples.percentile(p),
                ThresholdAgg::Med => samples.percentile(50.0),
                ThresholdAgg::Count => Some(samples.len() as f64),
                ThresholdAgg::Avg | ThresholdAgg::Min | ThresholdAgg::Max => {
                    let s = samples.summarize();
                    match agg {
                        ThresholdAgg::Avg => s.avg,
                        ThresholdAgg::Min => s.min,
                        _ => s.max,
                    }
                }
                _ => None,
            }
        }
    }
}
