use std::fmt::Write as _;

use surge_core::{
    DATA_RECEIVED, DATA_SENT, HTTP_REQ_DURATION, HTTP_REQ_FAILED, HTTP_REQS, MetricValue,
    RunResult, TrendSummary,
};

use super::duration::format_duration;
use super::format::{format_bytes, format_millis_opt, format_observed, format_rate};

pub(crate) fn render(result: &RunResult) -> String {
    let mut out = String::new();

    out.push_str("summary\n");
    writeln!(out, "scenario: {}", result.scenario).ok();
    writeln!(
        out,
        "  duration: {} vus_max: {} interrupted: {}",
        format_duration(result.duration),
        result.vus_max,
        result.interrupted_vus
    )
    .ok();

    let secs = result.duration.as_secs_f64().max(1e-9);
    let requests = counter(result, HTTP_REQS);
    let failed = match result.metric(HTTP_REQ_FAILED).map(|m| &m.values) {
        Some(MetricValue::Rate { hits, .. }) => *hits,
        _ => 0,
    };
    writeln!(
        out,
        "  requests: {requests} (failed {failed}) rps={}",
        format_rate(requests as f64 / secs)
    )
    .ok();
    writeln!(
        out,
        "  iterations: {} iters/s={}",
        result.iterations,
        format_rate(result.iterations as f64 / secs)
    )
    .ok();
    writeln!(
        out,
        "  bytes: recv {} sent {}",
        format_bytes(counter(result, DATA_RECEIVED)),
        format_bytes(counter(result, DATA_SENT))
    )
    .ok();

    match result.metric(HTTP_REQ_DURATION).map(|m| &m.values) {
        Some(MetricValue::Trend(t)) if t.count > 0 => {
            writeln!(out, "  latency = {}", trend_line(t)).ok();
        }
        _ => out.push_str("  latency: n/a\n"),
    }

    if result.thresholds_failed_during_run {
        out.push_str("  a continuous threshold failed during the run\n");
    }

    render_checks(result, &mut out);
    render_metrics(result, &mut out);
    render_thresholds(result, &mut out);

    out
}

fn counter(result: &RunResult, name: &str) -> u64 {
    match result.metric(name).map(|m| &m.values) {
        Some(MetricValue::Counter(n)) => *n,
        _ => 0,
    }
}

fn trend_line(t: &TrendSummary) -> String {
    format!(
        "avg={} min={} med={} p90={} p95={} p99={} max={} (n={})",
        format_millis_opt(t.avg),
        format_millis_opt(t.min),
        format_millis_opt(t.med),
        format_millis_opt(t.p90),
        format_millis_opt(t.p95),
        format_millis_opt(t.p99),
        format_millis_opt(t.max),
        t.count
    )
}

fn render_checks(result: &RunResult, out: &mut String) {
    if result.checks().is_empty() {
        return;
    }

    out.push_str("\nchecks\n");
    for c in result.checks() {
        let status = if c.fails > 0 { "FAIL" } else { "OK" };
        writeln!(out, "  {}: pass={} fail={} [{status}]", c.name, c.passes, c.fails).ok();
    }
}

fn render_metrics(result: &RunResult, out: &mut String) {
    if result.metrics.is_empty() {
        return;
    }

    out.push_str("\nmetrics\n");
    let secs = result.duration.as_secs_f64().max(1e-9);

    for m in &result.metrics {
        match &m.values {
            MetricValue::Counter(v) => {
                if m.name == DATA_RECEIVED || m.name == DATA_SENT {
                    writeln!(
                        out,
                        "  {} = {} ({}/s)",
                        m.name,
                        format_bytes(*v),
                        format_bytes((*v as f64 / secs).round() as u64)
                    )
                    .ok();
                } else {
                    writeln!(out, "  {} = {v} ({}/s)", m.name, format_rate(*v as f64 / secs)).ok();
                }
            }
            MetricValue::Gauge { value, max } => {
                writeln!(out, "  {} = {value} max={max}", m.name).ok();
            }
            MetricValue::Rate { total, hits, rate } => match rate {
                Some(rate) => {
                    writeln!(
                        out,
                        "  {} = {:.2}% hits={hits} total={total}",
                        m.name,
                        rate * 100.0
                    )
                    .ok();
                }
                None => {
                    writeln!(out, "  {} = - hits={hits} total={total}", m.name).ok();
                }
            },
            MetricValue::Trend(t) => {
                writeln!(out, "  {} = {}", m.name, trend_line(t)).ok();
            }
        }
    }
}

fn render_thresholds(result: &RunResult, out: &mut String) {
    if result.thresholds.is_empty() {
        return;
    }

    out.push_str("\nthresholds\n");
    for t in &result.thresholds {
        let status = if t.passed { "OK" } else { "FAIL" };
        writeln!(
            out,
            "  {}: {} observed={} [{status}]",
            t.selector,
            t.expression,
            format_observed(t.observed)
        )
        .ok();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use surge_core::{CheckSummary, Evaluation, MetricKind, MetricSummary, ThresholdOutcome};

    use super::*;

    fn metric(name: &str, kind: MetricKind, values: MetricValue) -> MetricSummary {
        MetricSummary {
            name: name.to_string(),
            kind,
            values,
        }
    }

    fn result() -> RunResult {
        RunResult {
            scenario: "load".to_string(),
            duration: Duration::from_secs(10),
            iterations: 50,
            vus_max: 5,
            interrupted_vus: 0,
            thresholds_failed_during_run: false,
            metrics: vec![
                metric(DATA_RECEIVED, MetricKind::Counter, MetricValue::Counter(2048)),
                metric(DATA_SENT, MetricKind::Counter, MetricValue::Counter(1024)),
                metric(
                    HTTP_REQ_DURATION,
                    MetricKind::Trend,
                    MetricValue::Trend(TrendSummary {
                        count: 100,
                        min: Some(1.0),
                        max: Some(250.0),
                        avg: Some(20.0),
                        med: Some(15.0),
                        p90: Some(40.0),
                        p95: Some(80.0),
                        p99: Some(200.0),
                    }),
                ),
                metric(HTTP_REQ_FAILED, MetricKind::Rate, MetricValue::rate(100, 2)),
                metric(HTTP_REQS, MetricKind::Counter, MetricValue::Counter(100)),
                metric(
                    "vus",
                    MetricKind::Gauge,
                    MetricValue::Gauge { value: 0, max: 5 },
                ),
            ],
            series: Vec::new(),
            checks: vec![CheckSummary {
                name: "status is 200".to_string(),
                passes: 98,
                fails: 2,
            }],
            thresholds: vec![
                ThresholdOutcome {
                    selector: "http_req_failed".to_string(),
                    expression: "rate<0.01".to_string(),
                    evaluation: Evaluation::Final,
                    observed: Some(0.02),
                    passed: false,
                },
                ThresholdOutcome {
                    selector: "http_req_duration{name:process}".to_string(),
                    expression: "p(95)<2000".to_string(),
                    evaluation: Evaluation::Final,
                    observed: Some(80.0),
                    passed: true,
                },
            ],
        }
    }

    #[test]
    fn render_includes_totals_and_latency() {
        let text = render(&result());
        assert!(text.contains("scenario: load"));
        assert!(text.contains("requests: 100 (failed 2) rps=10"));
        assert!(text.contains("iterations: 50 iters/s=5"));
        assert!(text.contains("bytes: recv 2.00KiB sent 1.00KiB"));
        assert!(text.contains("latency = avg=20.00ms"));
        assert!(text.contains("p95=80.00ms"));
        assert!(text.contains("(n=100)"));
    }

    #[test]
    fn render_lists_checks_metrics_and_thresholds() {
        let text = render(&result());
        assert!(text.contains("status is 200: pass=98 fail=2 [FAIL]"));
        assert!(text.contains("http_req_failed = 2.00% hits=2 total=100"));
        assert!(text.contains("vus = 0 max=5"));
        assert!(text.contains("http_req_failed: rate<0.01 observed=0.0200 [FAIL]"));
        assert!(text.contains("http_req_duration{name:process}: p(95)<2000 observed=80 [OK]"));
    }

    #[test]
    fn render_without_requests_says_na() {
        let mut r = result();
        r.metrics.clear();
        r.checks.clear();
        r.thresholds.clear();
        let text = render(&r);
        assert!(text.contains("requests: 0 (failed 0)"));
        assert!(text.contains("latency: n/a"));
        assert!(!text.contains("\nchecks\n"));
        assert!(!text.contains("\nthresholds\n"));
    }
}
