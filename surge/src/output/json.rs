use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use surge_core::{MetricValue, ProgressFn, ProgressUpdate, RunPlan, RunResult};

use super::OutputFormatter;

pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _scenario_path: &Path, _plan: &RunPlan) {}

    fn progress(&self) -> Option<ProgressFn> {
        Some(Arc::new(move |u: ProgressUpdate| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, result: &RunResult) -> anyhow::Result<()> {
        let line = build_summary(result);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub scenario: String,
    pub elapsed_secs: f64,
    pub total_secs: f64,
    pub active_vus: u64,
    pub stage: Option<JsonStage>,
    pub thresholds_failing: bool,

    pub requests_per_sec: f64,
    pub iterations_per_sec: f64,
    pub requests_total: u64,
    pub failed_requests_total: u64,
    pub iterations_total: u64,
    pub checks_failed_total: u64,
    pub latency_p95_ms: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonStage {
    pub stage: usize,
    pub stages: usize,
    pub target: u64,
    pub remaining_secs: f64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        scenario: u.scenario.clone(),
        elapsed_secs: u.elapsed.as_secs_f64(),
        total_secs: u.total_duration.as_secs_f64(),
        active_vus: u.active_vus,
        stage: u.stage.as_ref().map(|s| JsonStage {
            stage: s.stage,
            stages: s.stages,
            target: s.current_target,
            remaining_secs: s.stage_remaining.as_secs_f64(),
        }),
        thresholds_failing: u.thresholds_failing,

        requests_per_sec: u.metrics.rps_now,
        iterations_per_sec: u.metrics.iterations_per_sec_now,
        requests_total: u.metrics.requests_total,
        failed_requests_total: u.metrics.failed_requests_total,
        iterations_total: u.metrics.iterations_total,
        checks_failed_total: u.metrics.checks_failed_total,
        latency_p95_ms: u.metrics.latency_p95_ms,
    }
}

/// The final summary. Printed as the last NDJSON line and written by `--summary-export`.
#[derive(Debug, Serialize)]
pub(crate) struct JsonSummary {
    pub kind: &'static str,
    pub scenario: String,
    pub passed: bool,
    pub duration_secs: f64,
    pub iterations: u64,
    pub vus_max: u64,
    pub interrupted_vus: u64,
    pub thresholds_failed_during_run: bool,
    pub metrics: BTreeMap<String, JsonMetric>,
    pub checks: Vec<JsonCheck>,
    pub thresholds: Vec<JsonThreshold>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum JsonMetric {
    Counter {
        count: u64,
        rate: f64,
    },
    Gauge {
        value: i64,
        max: i64,
    },
    Rate {
        rate: Option<f64>,
        passes: u64,
        fails: u64,
    },
    Trend {
        count: u64,
        avg: Option<f64>,
        min: Option<f64>,
        med: Option<f64>,
        max: Option<f64>,
        #[serde(rename = "p(90)")]
        p90: Option<f64>,
        #[serde(rename = "p(95)")]
        p95: Option<f64>,
        #[serde(rename = "p(99)")]
        p99: Option<f64>,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonCheck {
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold {
    pub selector: String,
    pub expression: String,
    pub evaluation: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

pub(crate) fn build_summary(result: &RunResult) -> JsonSummary {
    let secs = result.duration.as_secs_f64().max(1e-9);

    let metrics = result
        .metrics
        .iter()
        .map(|m| {
            let v = match &m.values {
                MetricValue::Counter(count) => JsonMetric::Counter {
                    count: *count,
                    rate: *count as f64 / secs,
                },
                MetricValue::Gauge { value, max } => JsonMetric::Gauge {
                    value: *value,
                    max: *max,
                },
                MetricValue::Rate { total, hits, rate } => JsonMetric::Rate {
                    rate: *rate,
                    passes: *hits,
                    fails: total.saturating_sub(*hits),
                },
                MetricValue::Trend(t) => JsonMetric::Trend {
                    count: t.count,
                    avg: t.avg,
                    min: t.min,
                    med: t.med,
                    max: t.max,
                    p90: t.p90,
                    p95: t.p95,
                    p99: t.p99,
                },
            };
            (m.name.clone(), v)
        })
        .collect();

    JsonSummary {
        kind: "summary",
        scenario: result.scenario.clone(),
        passed: result.passed(),
        duration_secs: result.duration.as_secs_f64(),
        iterations: result.iterations,
        vus_max: result.vus_max,
        interrupted_vus: result.interrupted_vus,
        thresholds_failed_during_run: result.thresholds_failed_during_run,
        metrics,
        checks: result
            .checks()
            .iter()
            .map(|c| JsonCheck {
                name: c.name.clone(),
                passes: c.passes,
                fails: c.fails,
            })
            .collect(),
        thresholds: result
            .thresholds
            .iter()
            .map(|t| JsonThreshold {
                selector: t.selector.clone(),
                expression: t.expression.clone(),
                evaluation: t.evaluation.to_string(),
                observed: t.observed,
                passed: t.passed,
            })
            .collect(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Value;
    use surge_core::{
        CheckSummary, Evaluation, LiveMetrics, MetricKind, MetricSummary, StageProgress,
        ThresholdOutcome, TrendSummary,
    };

    use super::*;

    #[test]
    fn progress_line_has_kind_and_stage() {
        let update = ProgressUpdate {
            tick: 3,
            elapsed: Duration::from_secs(15),
            total_duration: Duration::from_secs(60),
            scenario: "spike".to_string(),
            active_vus: 42,
            stage: Some(StageProgress {
                stage: 2,
                stages: 4,
                stage_elapsed: Duration::from_secs(5),
                stage_remaining: Duration::from_secs(5),
                start_target: 10,
                end_target: 100,
                current_target: 55,
            }),
            thresholds_failing: true,
            metrics: LiveMetrics {
                rps_now: 120.0,
                requests_total: 1800,
                ..LiveMetrics::default()
            },
        };

        let v: Value = match serde_json::to_value(build_progress_line(&update)) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        };
        assert_eq!(v.get("kind").and_then(Value::as_str), Some("progress"));
        assert_eq!(v.get("active_vus").and_then(Value::as_u64), Some(42));
        assert_eq!(v.pointer("/stage/target").and_then(Value::as_u64), Some(55));
        assert_eq!(v.get("thresholds_failing").and_then(Value::as_bool), Some(true));
        assert_eq!(v.get("latency_p95_ms"), Some(&Value::Null));
    }

    #[test]
    fn summary_has_metrics_checks_and_thresholds() {
        let result = RunResult {
            scenario: "load".to_string(),
            duration: Duration::from_secs(4),
            iterations: 10,
            vus_max: 3,
            interrupted_vus: 1,
            thresholds_failed_during_run: false,
            metrics: vec![
                MetricSummary {
                    name: "http_reqs".to_string(),
                    kind: MetricKind::Counter,
                    values: MetricValue::Counter(40),
                },
                MetricSummary {
                    name: "http_req_failed".to_string(),
                    kind: MetricKind::Rate,
                    values: MetricValue::rate(40, 4),
                },
                MetricSummary {
                    name: "http_req_duration".to_string(),
                    kind: MetricKind::Trend,
                    values: MetricValue::Trend(TrendSummary {
                        count: 40,
                        min: Some(1.0),
                        max: Some(9.0),
                        avg: Some(3.0),
                        med: Some(2.0),
                        p90: Some(7.0),
                        p95: Some(8.0),
                        p99: Some(9.0),
                    }),
                },
            ],
            series: Vec::new(),
            checks: vec![CheckSummary {
                name: "status is 200".to_string(),
                passes: 36,
                fails: 4,
            }],
            thresholds: vec![ThresholdOutcome {
                selector: "http_req_failed".to_string(),
                expression: "rate<0.01".to_string(),
                evaluation: Evaluation::Continuous,
                observed: Some(0.1),
                passed: false,
            }],
        };

        let v: Value = match serde_json::to_value(build_summary(&result)) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        };

        assert_eq!(v.get("kind").and_then(Value::as_str), Some("summary"));
        assert_eq!(v.get("passed").and_then(Value::as_bool), Some(false));
        assert_eq!(v.get("interrupted_vus").and_then(Value::as_u64), Some(1));
        assert_eq!(
            v.pointer("/metrics/http_reqs/type").and_then(Value::as_str),
            Some("counter")
        );
        assert_eq!(
            v.pointer("/metrics/http_reqs/rate").and_then(Value::as_f64),
            Some(10.0)
        );
        assert_eq!(
            v.pointer("/metrics/http_req_failed/fails").and_then(Value::as_u64),
            Some(36)
        );
        assert_eq!(
            v.pointer("/metrics/http_req_duration/p(95)").and_then(Value::as_f64),
            Some(8.0)
        );
        assert_eq!(
            v.pointer("/checks/0/fails").and_then(Value::as_u64),
            Some(4)
        );
        assert_eq!(
            v.pointer("/thresholds/0/evaluation").and_then(Value::as_str),
            Some("continuous")
        );
    }
}
