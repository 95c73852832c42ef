use std::collections::BTreeMap;
use std::time::Duration;

use surge_metrics::{MetricKind, MetricSeriesSummary, MetricValue, Registry};

use crate::checks::CHECKS;
use crate::thresholds_eval::ThresholdOutcome;

/// One metric merged across all of its series.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSummary {
    pub name: String,
    pub kind: MetricKind,
    pub values: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSummary {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

/// Final, immutable outcome of a run. Reporters read it; nothing writes to it.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub scenario: String,
    pub duration: Duration,
    pub iterations: u64,
    /// Highest number of VUs that ran concurrently.
    pub vus_max: u64,
    /// VUs still running at the graceful-stop deadline that had to be aborted.
    pub interrupted_vus: u64,
    pub thresholds_failed_during_run: bool,
    /// Sorted by name.
    pub metrics: Vec<MetricSummary>,
    /// Every (metric, tag set) series, sorted by name then tags.
    pub series: Vec<MetricSeriesSummary>,
    /// Sorted by check name.
    pub checks: Vec<CheckSummary>,
    pub thresholds: Vec<ThresholdOutcome>,
}

impl RunResult {
    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.iter().find(|m| m.name == name)
    }

    /// Outcomes of every expression declared on `selector`.
    pub fn threshold<'a>(&'a self, selector: &'a str) -> impl Iterator<Item = &'a ThresholdOutcome> + 'a {
        self.thresholds.iter().filter(move |t| t.selector == selector)
    }

    pub fn checks(&self) -> &[CheckSummary] {
        &self.checks
    }

    /// True when every threshold passed at run end.
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn failed_thresholds(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.thresholds.iter().filter(|t| !t.passed)
    }
}

/// Run-level numbers the registry cannot know.
#[derive(Debug, Clone)]
pub(crate) struct RunFacts {
    pub scenario: String,
    pub duration: Duration,
    pub interrupted_vus: u64,
    pub thresholds_failed_during_run: bool,
    pub thresholds: Vec<ThresholdOutcome>,
    pub iterations_metric: &'static str,
    pub vus_metric: &'static str,
}

pub(crate) fn collect(metrics: &Registry, facts: RunFacts) -> RunResult {
    let merged = merge_metrics(metrics);

    let iterations = match merged
        .iter()
        .find(|m| m.name == facts.iterations_metric)
        .map(|m| &m.values)
    {
        Some(MetricValue::Counter(n)) => *n,
        _ => 0,
    };
    let vus_max = match merged
        .iter()
        .find(|m| m.name == facts.vus_metric)
        .map(|m| &m.values)
    {
        Some(MetricValue::Gauge { max, .. }) => u64::try_from(*max).unwrap_or(0),
        _ => 0,
    };

    let series = metrics.summarize();
    let checks = check_summaries(&series);

    RunResult {
        scenario: facts.scenario,
        duration: facts.duration,
        iterations,
        vus_max,
        interrupted_vus: facts.interrupted_vus,
        thresholds_failed_during_run: facts.thresholds_failed_during_run,
        metrics: merged,
        series,
        checks,
        thresholds: facts.thresholds,
    }
}

fn merge_metrics(metrics: &Registry) -> Vec<MetricSummary> {
    let mut out: Vec<MetricSummary> = metrics
        .metrics()
        .into_iter()
        .map(|(id, name, kind)| {
            let values = match kind {
                MetricKind::Counter => MetricValue::Counter(metrics.query(id).sum_counter_total()),
                MetricKind::Gauge => MetricValue::Gauge {
                    value: metrics.query(id).gauge_sum(),
                    max: metrics.query(id).gauge_max().unwrap_or(0),
                },
                MetricKind::Rate => {
                    let totals = metrics.query(id).sum_rate();
                    MetricValue::rate(totals.total, totals.hits)
                }
                MetricKind::Trend => MetricValue::Trend(metrics.query(id).merge_trend().summarize()),
            };
            MetricSummary { name, kind, values }
        })
        .collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}

fn check_summaries(series: &[MetricSeriesSummary]) -> Vec<CheckSummary> {
    let mut by_name: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for s in series.iter().filter(|s| s.name == CHECKS) {
        let Some((_, name)) = s.tags.iter().find(|(k, _)| k == "check") else {
            continue;
        };
        if let MetricValue::Rate { total, hits, .. } = s.values {
            let entry = by_name.entry(name.as_str()).or_default();
            entry.0 += hits;
            entry.1 += total.saturating_sub(hits);
        }
    }
    by_name
        .into_iter()
        .map(|(name, (passes, fails))| CheckSummary {
            name: name.to_string(),
            passes,
            fails,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::{CheckMetricIds, CheckResult};
    use crate::iteration_metrics::{ITERATIONS, VUS};

    fn facts() -> RunFacts {
        RunFacts {
            scenario: "load".to_string(),
            duration: Duration::from_secs(3),
            interrupted_vus: 0,
            thresholds_failed_during_run: false,
            thresholds: Vec::new(),
            iterations_metric: ITERATIONS,
            vus_metric: VUS,
        }
    }

    #[test]
    fn checks_are_merged_across_series() {
        let metrics = Registry::default();
        let ids = CheckMetricIds::register(&metrics).unwrap_or_else(|e| panic!("{e}"));
        let results = [
            CheckResult {
                name: "status is 200".to_string(),
                passed: true,
            },
            CheckResult {
                name: "has trace id".to_string(),
                passed: false,
            },
        ];
        ids.record(&metrics, &results, &[("scenario", "load"), ("group", "a")]);
        ids.record(&metrics, &results[..1], &[("scenario", "load"), ("group", "b")]);

        let result = collect(&metrics, facts());
        assert_eq!(
            result.checks(),
            &[
                CheckSummary {
                    name: "has trace id".to_string(),
                    passes: 0,
                    fails: 1,
                },
                CheckSummary {
                    name: "status is 200".to_string(),
                    passes: 2,
                    fails: 0,
                },
            ]
        );
        assert!(matches!(
            result.metric(CHECKS).map(|m| &m.values),
            Some(MetricValue::Rate { total: 3, hits: 2, .. })
        ));
    }

    #[test]
    fn passed_requires_every_threshold() {
        let metrics = Registry::default();
        let mut f = facts();
        f.thresholds = vec![
            ThresholdOutcome {
                selector: "http_req_failed".to_string(),
                expression: "rate<0.1".to_string(),
                evaluation: crate::thresholds::Evaluation::Final,
                observed: Some(0.0),
                passed: true,
            },
            ThresholdOutcome {
                selector: "http_req_duration".to_string(),
                expression: "p(95)<1".to_string(),
                evaluation: crate::thresholds::Evaluation::Final,
                observed: None,
                passed: false,
            },
        ];
        let result = collect(&metrics, f);
        assert!(!result.passed());
        assert_eq!(result.threshold("http_req_failed").count(), 1);
        assert_eq!(result.failed_thresholds().count(), 1);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.vus_max, 0);
    }
}
