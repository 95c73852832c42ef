use std::ops::RangeInclusive;
use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use surge_metrics::{MetricKind, Registry};

use crate::checks::Check;
use crate::error::{Error, Result};

/// What a VU runs every iteration.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    /// Scenario-level tags added to every sample.
    pub tags: Vec<(String, String)>,
    pub actions: Vec<Action>,
    /// Think time after each iteration.
    pub pacing: SleepRange,
}

impl Scenario {
    pub fn new(name: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            actions,
            pacing: SleepRange::ZERO,
        }
    }

    #[must_use]
    pub fn with_pacing(mut self, pacing: SleepRange) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("scenario name must not be empty".to_string()));
        }
        if self.actions.is_empty() {
            return Err(Error::Config(format!(
                "scenario `{}` has no actions",
                self.name
            )));
        }
        self.pacing.validate("pacing")?;
        for action in &self.actions {
            action.validate()?;
        }
        Ok(())
    }

    /// Every request action in the tree, depth first.
    pub fn requests(&self) -> Vec<&RequestAction> {
        let mut out = Vec::new();
        for action in &self.actions {
            action.collect_requests(&mut out);
        }
        out
    }

    /// Register the custom metrics referenced by request actions.
    pub fn register_metrics(&self, metrics: &Registry) -> Result<()> {
        for req in self.requests() {
            if let Some(name) = &req.success_metric {
                metrics.register(name, MetricKind::Rate)?;
            }
            if let Some(name) = &req.duration_metric {
                metrics.register(name, MetricKind::Trend)?;
            }
            if let Some(name) = &req.error_metric {
                metrics.register(name, MetricKind::Counter)?;
            }
        }
        Ok(())
    }
}

/// One step of a scenario iteration.
#[derive(Debug, Clone)]
pub enum Action {
    Request(Box<RequestAction>),
    /// Run `action` with the given probability in `0.0..=1.0`.
    Conditional {
        probability: f64,
        action: Box<Action>,
    },
    Sleep(SleepRange),
    /// Run exactly one child, picked by weight.
    Weighted(Vec<WeightedAction>),
    /// Nested actions whose samples carry a `group` tag.
    Group { name: String, actions: Vec<Action> },
}

#[derive(Debug, Clone)]
pub struct WeightedAction {
    pub weight: u32,
    pub action: Action,
}

impl Action {
    pub fn request(req: RequestAction) -> Self {
        Action::Request(Box::new(req))
    }

    pub fn maybe(probability: f64, action: Action) -> Self {
        Action::Conditional {
            probability,
            action: Box::new(action),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Action::Request(req) => req.validate(),
            Action::Conditional {
                probability,
                action,
            } => {
                if !(0.0..=1.0).contains(probability) {
                    return Err(Error::Config(format!(
                        "probability must be within 0..=1, got {probability}"
                    )));
                }
                action.validate()
            }
            Action::Sleep(range) => range.validate("sleep"),
            Action::Weighted(choices) => {
                if choices.iter().map(|c| u64::from(c.weight)).sum::<u64>() == 0 {
                    return Err(Error::Config(
                        "weighted action needs at least one positive weight".to_string(),
                    ));
                }
                choices.iter().try_for_each(|c| c.action.validate())
            }
            Action::Group { name, actions } => {
                if name.trim().is_empty() {
                    return Err(Error::Config("group name must not be empty".to_string()));
                }
                actions.iter().try_for_each(Action::validate)
            }
        }
    }

    fn collect_requests<'a>(&'a self, out: &mut Vec<&'a RequestAction>) {
        match self {
            Action::Request(req) => out.push(req),
            Action::Conditional { action, .. } => action.collect_requests(out),
            Action::Sleep(_) => {}
            Action::Weighted(choices) => {
                for c in choices {
                    c.action.collect_requests(out);
                }
            }
            Action::Group { actions, .. } => {
                for a in actions {
                    a.collect_requests(out);
                }
            }
        }
    }
}

/// Uniformly random delay in `min..=max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepRange {
    pub min: Duration,
    pub max: Duration,
}

impl SleepRange {
    pub const ZERO: SleepRange = SleepRange {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn fixed(d: Duration) -> Self {
        Self { min: d, max: d }
    }

    pub fn is_zero(&self) -> bool {
        self.max.is_zero()
    }

    fn validate(&self, what: &str) -> Result<()> {
        if self.min > self.max {
            return Err(Error::Config(format!(
                "{what}: min ({:?}) must not exceed max ({:?})",
                self.min, self.max
            )));
        }
        Ok(())
    }

    pub fn sample(&self, rng: &mut impl Rng) -> Duration {
        if self.min >= self.max {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }
}

/// Statuses that count as an expected response. Defaults to `200..=399`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedStatuses {
    ranges: Vec<RangeInclusive<u16>>,
}

impl Default for ExpectedStatuses {
    fn default() -> Self {
        Self {
            ranges: vec![200..=399],
        }
    }
}

impl ExpectedStatuses {
    pub fn only(ranges: Vec<RangeInclusive<u16>>) -> Self {
        Self { ranges }
    }

    #[must_use]
    pub fn with(mut self, status: u16) -> Self {
        if !self.contains(status) {
            self.ranges.push(status..=status);
        }
        self
    }

    pub fn contains(&self, status: u16) -> bool {
        self.ranges.iter().any(|r| r.contains(&status))
    }
}

#[derive(Debug, Clone)]
pub struct RequestAction {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub timeout: Duration,
    /// Caller tags, e.g. `name=process`.
    pub tags: Vec<(String, String)>,
    pub expected_statuses: ExpectedStatuses,
    pub checks: Vec<Check>,
    /// Rate fed with "transport ok and every check passed".
    pub success_metric: Option<String>,
    /// Trend fed with the request latency in milliseconds.
    pub duration_metric: Option<String>,
    /// Counter bumped when the request is not a success.
    pub error_metric: Option<String>,
    /// JSON path logged for correlation (e.g. `data.trace_id`).
    pub log_json_path: Option<String>,
}

impl RequestAction {
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: Duration::from_secs(60),
            tags: Vec::new(),
            expected_statuses: ExpectedStatuses::default(),
            checks: Vec::new(),
            success_metric: None,
            duration_metric: None,
            error_metric: None,
            log_json_path: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(http::Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let mut req = Self::new(http::Method::POST, url);
        req.body = Some(body.into());
        req
    }

    #[must_use]
    pub fn named(self, name: &str) -> Self {
        self.tag("name", name)
    }

    #[must_use]
    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.retain(|(k, _)| k != key);
        self.tags.push((key.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn expect_status(mut self, status: u16) -> Self {
        self.expected_statuses = self.expected_statuses.with(status);
        self
    }

    #[must_use]
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    #[must_use]
    pub fn success_metric(mut self, name: &str) -> Self {
        self.success_metric = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn duration_metric(mut self, name: &str) -> Self {
        self.duration_metric = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn error_metric(mut self, name: &str) -> Self {
        self.error_metric = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn log_json_path(mut self, path: &str) -> Self {
        self.log_json_path = Some(path.to_string());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == "name")
            .map(|(_, v)| v.as_str())
    }

    fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::Config("request url must not be empty".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config(format!(
                "request `{}` must have a positive timeout",
                self.url
            )));
        }
        let mut seen: Vec<&str> = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            if seen.contains(&check.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate check name `{}` on request `{}`",
                    check.name, self.url
                )));
            }
            seen.push(&check.name);
        }
        Ok(())
    }
}
