use std::time::Duration;

use surge_metrics::{MetricId, MetricKind, Registry};

use crate::error::Result;

pub const HTTP_REQS: &str = "http_reqs";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const HTTP_REQ_ERRORS: &str = "http_req_errors";
pub const DATA_SENT: &str = "data_sent";
pub const DATA_RECEIVED: &str = "data_received";

/// Tag keys set by the executor; caller tags cannot override them.
pub const RESERVED_REQUEST_TAGS: &[&str] = &[
    "scenario",
    "group",
    "method",
    "status",
    "expected_response",
    "error_kind",
];

#[derive(Debug, Clone, Copy)]
pub struct RequestMetricIds {
    pub http_reqs: MetricId,
    /// Request latency in milliseconds.
    pub http_req_duration: MetricId,
    /// Hit when the response is not expected.
    pub http_req_failed: MetricId,
    /// Transport errors only, tagged with `error_kind`.
    pub http_req_errors: MetricId,
    pub data_sent: MetricId,
    pub data_received: MetricId,
}

#[derive(Debug, Clone, Copy)]
pub struct RequestSample<'a> {
    pub method: &'a str,
    pub status: u16,
    pub expected: bool,
    pub elapsed: Duration,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub error_kind: Option<&'a str>,
}

impl RequestMetricIds {
    pub fn register(metrics: &Registry) -> Result<Self> {
        Ok(Self {
            http_reqs: metrics.register(HTTP_REQS, MetricKind::Counter)?,
            http_req_duration: metrics.register(HTTP_REQ_DURATION, MetricKind::Trend)?,
            http_req_failed: metrics.register(HTTP_REQ_FAILED, MetricKind::Rate)?,
            http_req_errors: metrics.register(HTTP_REQ_ERRORS, MetricKind::Counter)?,
            data_sent: metrics.register(DATA_SENT, MetricKind::Counter)?,
            data_received: metrics.register(DATA_RECEIVED, MetricKind::Counter)?,
        })
    }

    /// Record one request under a single tag set: `base_tags` + `method`, `status`,
    /// `expected_response`.
    pub fn record_request(
        &self,
        metrics: &Registry,
        sample: RequestSample<'_>,
        base_tags: &[(&str, &str)],
    ) {
        let status = sample.status.to_string();
        let expected = if sample.expected { "true" } else { "false" };

        let mut tags: Vec<(&str, &str)> = Vec::with_capacity(base_tags.len() + 4);
        tags.extend_from_slice(base_tags);
        tags.push(("method", sample.method));
        tags.push(("status", status.as_str()));
        tags.push(("expected_response", expected));
        let tag_set = metrics.resolve_tags(&tags);

        if let Some(h) = metrics.get_handle(self.http_reqs, tag_set.clone()) {
            h.increment(1);
        }
        if let Some(h) = metrics.get_handle(self.http_req_duration, tag_set.clone()) {
            h.observe(sample.elapsed.as_secs_f64() * 1_000.0);
        }
        if let Some(h) = metrics.get_handle(self.http_req_failed, tag_set.clone()) {
            h.add_rate(!sample.expected);
        }
        if let Some(h) = metrics.get_handle(self.data_sent, tag_set.clone()) {
            h.increment(sample.bytes_sent);
        }
        if let Some(h) = metrics.get_handle(self.data_received, tag_set) {
            h.increment(sample.bytes_received);
        }

        if let Some(kind) = sample.error_kind {
            tags.push(("error_kind", kind));
            if let Some(h) = metrics.get_handle(self.http_req_errors, metrics.resolve_tags(&tags)) {
                h.increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_request_lands_in_one_series_per_metric() {
        let metrics = Registry::default();
        let ids = RequestMetricIds::register(&metrics).unwrap_or_else(|e| panic!("{e}"));

        let base = [("scenario", "load"), ("name", "process")];
        ids.record_request(
            &metrics,
            RequestSample {
                method: "GET",
                status: 503,
                expected: false,
                elapsed: Duration::from_millis(120),
                bytes_sent: 40,
                bytes_received: 90,
                error_kind: None,
            },
            &base,
        );

        assert_eq!(metrics.query(ids.http_reqs).sum_counter_total(), 1);
        assert_eq!(metrics.query(ids.data_received).sum_counter_total(), 90);
        assert_eq!(metrics.query(ids.http_req_failed).sum_rate().rate(), Some(1.0));
        assert_eq!(metrics.query(ids.http_req_errors).sum_counter_total(), 0);

        let by_name = metrics
            .query(ids.http_req_duration)
            .where_tags(&[
                ("name".to_string(), "process".to_string()),
                ("status".to_string(), "503".to_string()),
            ])
            .merge_trend_summary()
            .unwrap_or_else(|| panic!("expected duration samples"));
        assert_eq!(by_name.count, 1);
        assert!((by_name.max.unwrap_or_default() - 120.0).abs() < 1e-6);
    }

    #[test]
    fn transport_errors_are_counted_by_kind() {
        let metrics = Registry::default();
        let ids = RequestMetricIds::register(&metrics).unwrap_or_else(|e| panic!("{e}"));

        ids.record_request(
            &metrics,
            RequestSample {
                method: "GET",
                status: 0,
                expected: false,
                elapsed: Duration::from_millis(5),
                bytes_sent: 0,
                bytes_received: 0,
                error_kind: Some("timeout"),
            },
            &[("scenario", "load")],
        );

        let timeouts = metrics
            .query(ids.http_req_errors)
            .where_tags(&[("error_kind".to_string(), "timeout".to_string())])
            .sum_counter_total();
        assert_eq!(timeouts, 1);
    }
}
