use std::time::Duration;

use surge_metrics::{CounterSnapshot, MetricId, Registry};

use crate::checks::CHECKS;
use crate::iteration_metrics::ITERATIONS;
use crate::request_metrics::{HTTP_REQ_DURATION, HTTP_REQ_FAILED, HTTP_REQS};
use crate::schedule::StageSnapshot;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveMetrics {
    /// Requests/sec observed during the last progress interval.
    pub rps_now: f64,
    pub requests_total: u64,
    /// Requests that were not expected (`http_req_failed` hits).
    pub failed_requests_total: u64,
    pub iterations_total: u64,
    pub iterations_per_sec_now: f64,
    pub checks_failed_total: u64,
    /// Latency over the whole run so far, in milliseconds.
    pub latency_p95_ms: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

impl From<StageSnapshot> for StageProgress {
    fn from(st: StageSnapshot) -> Self {
        Self {
            stage: st.index + 1,
            stages: st.count,
            stage_elapsed: st.stage_elapsed,
            stage_remaining: st.stage_remaining,
            start_target: st.start_target,
            end_target: st.end_target,
            current_target: st.current_target,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based) for progress emissions.
    pub tick: u64,
    pub elapsed: Duration,
    pub total_duration: Duration,
    pub scenario: String,
    pub active_vus: u64,
    pub stage: Option<StageProgress>,
    /// A continuous threshold has failed at least once so far.
    pub thresholds_failing: bool,
    pub metrics: LiveMetrics,
}

pub type ProgressFn = std::sync::Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

/// Turns registry totals into per-interval live numbers.
#[derive(Debug)]
pub(crate) struct LiveSampler {
    http_reqs: Option<MetricId>,
    http_req_failed: Option<MetricId>,
    http_req_duration: Option<MetricId>,
    iterations: Option<MetricId>,
    checks: Option<MetricId>,
    prev_reqs: Option<CounterSnapshot>,
    prev_iterations: Option<CounterSnapshot>,
}

impl LiveSampler {
    pub(crate) fn new(metrics: &Registry) -> Self {
        let id = |name: &str| metrics.lookup_metric(name).map(|(id, _)| id);
        Self {
            http_reqs: id(HTTP_REQS),
            http_req_failed: id(HTTP_REQ_FAILED),
            http_req_duration: id(HTTP_REQ_DURATION),
            iterations: id(ITERATIONS),
            checks: id(CHECKS),
            prev_reqs: None,
            prev_iterations: None,
        }
    }

    pub(crate) fn sample(&mut self, metrics: &Registry, dt: Duration) -> LiveMetrics {
        let dt_secs = dt.as_secs_f64();
        let counter = |id: Option<MetricId>| {
            CounterSnapshot::new(id.map_or(0, |id| metrics.query(id).sum_counter_total()))
        };

        let reqs = counter(self.http_reqs);
        let iterations = counter(self.iterations);
        let rps_now = reqs.per_sec_since(self.prev_reqs, dt_secs);
        let iterations_per_sec_now = iterations.per_sec_since(self.prev_iterations, dt_secs);
        self.prev_reqs = Some(reqs);
        self.prev_iterations = Some(iterations);

        LiveMetrics {
            rps_now,
            requests_total: reqs.total,
            failed_requests_total: self
                .http_req_failed
                .map_or(0, |id| metrics.query(id).sum_rate().hits),
            iterations_total: iterations.total,
            iterations_per_sec_now,
            checks_failed_total: self
                .checks
                .map_or(0, |id| metrics.query(id).sum_rate().misses()),
            latency_p95_ms: self
                .http_req_duration
                .and_then(|id| metrics.query(id).merge_trend().percentile(95.0)),
        }
    }
}
