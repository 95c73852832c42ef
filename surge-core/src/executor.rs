use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use surge_http::{HttpClient, HttpRequest, TransportErrorKind};
use surge_metrics::Registry;

use crate::error::Result;
use crate::metrics_context::MetricsContext;
use crate::request_metrics::{RESERVED_REQUEST_TAGS, RequestMetricIds, RequestSample};
use crate::scenario::RequestAction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

/// Outcome of one request. Transport failures are values: `status` is 0 and `error` is set.
#[derive(Debug)]
pub struct TargetResponse {
    pub status: u16,
    pub body: Bytes,
    pub headers: Vec<(String, String)>,
    pub elapsed: Duration,
    pub error: Option<TransportError>,
    /// No transport error and the status is in the request's expected set.
    pub expected: bool,
    json: OnceLock<Option<serde_json::Value>>,
}

impl TargetResponse {
    pub fn new(status: u16, body: impl Into<Bytes>, elapsed: Duration) -> Self {
        Self {
            status,
            body: body.into(),
            headers: Vec::new(),
            elapsed,
            error: None,
            expected: (200..=399).contains(&status),
            json: OnceLock::new(),
        }
    }

    pub fn transport_failure(error: TransportError, elapsed: Duration) -> Self {
        Self {
            status: 0,
            body: Bytes::new(),
            headers: Vec::new(),
            elapsed,
            error: Some(error),
            expected: false,
            json: OnceLock::new(),
        }
    }

    pub fn is_transport_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn body_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Body parsed as JSON, once. `None` if the body is not valid JSON.
    pub fn json(&self) -> Option<&serde_json::Value> {
        self.json
            .get_or_init(|| serde_json::from_slice(&self.body).ok())
            .as_ref()
    }

    /// Dotted path lookup (`data.trace_id`, `items.0.id`).
    pub fn json_path(&self, path: &str) -> Option<&serde_json::Value> {
        json_path(self.json()?, path)
    }
}

pub fn json_path<'a>(root: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut cur = root;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        cur = match cur {
            serde_json::Value::Object(map) => map.get(segment)?,
            serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Issues requests and records the built-in HTTP metrics for each of them.
#[derive(Debug, Clone)]
pub struct TargetExecutor {
    client: HttpClient,
    metrics: Arc<Registry>,
    ids: RequestMetricIds,
}

impl TargetExecutor {
    pub fn new(client: HttpClient, metrics: Arc<Registry>) -> Result<Self> {
        let ids = RequestMetricIds::register(&metrics)?;
        Ok(Self {
            client,
            metrics,
            ids,
        })
    }

    pub fn metrics(&self) -> &Arc<Registry> {
        &self.metrics
    }

    /// Perform `req`. Never fails: transport errors come back as `status == 0`.
    pub async fn execute(&self, req: &RequestAction, ctx: &MetricsContext) -> TargetResponse {
        let mut http_req = HttpRequest::new(req.method.clone(), req.url.clone())
            .with_timeout(req.timeout);
        http_req.headers = req.headers.clone();
        if let Some(body) = &req.body {
            http_req.body = body.clone();
        }

        let started = Instant::now();
        let (response, bytes_sent, bytes_received) = match self.client.request(http_req).await {
            Ok(res) => {
                let mut out = TargetResponse::new(res.status, res.body, res.elapsed);
                out.headers = res.headers;
                out.expected = req.expected_statuses.contains(res.status);
                (out, res.bytes_sent, res.bytes_received)
            }
            Err(err) => {
                tracing::debug!(
                    url = %req.url,
                    error_kind = %err.kind(),
                    error = %err,
                    "request failed"
                );
                let error = TransportError {
                    kind: err.kind(),
                    message: err.to_string(),
                };
                (
                    TargetResponse::transport_failure(error, started.elapsed()),
                    0,
                    0,
                )
            }
        };

        let error_kind = response.error.as_ref().map(|e| e.kind.to_string());
        let mut tags = ctx.base_tags(RESERVED_REQUEST_TAGS);
        for (k, v) in &req.tags {
            if RESERVED_REQUEST_TAGS.contains(&k.as_str()) {
                continue;
            }
            tags.push((k.as_str(), v.as_str()));
        }
        if req.name().is_none() {
            tags.push(("name", req.url.as_str()));
        }

        self.ids.record_request(
            &self.metrics,
            RequestSample {
                method: req.method.as_str(),
                status: response.status,
                expected: response.expected,
                elapsed: response.elapsed,
                bytes_sent,
                bytes_received,
                error_kind: error_kind.as_deref(),
            },
            &tags,
        );

        response
    }
}
