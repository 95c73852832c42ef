use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use surge_metrics::{MetricId, MetricKind, Registry};

use crate::error::Result;
use crate::executor::TargetResponse;

pub const CHECKS: &str = "checks";

pub type CheckFn = Arc<dyn Fn(&TargetResponse) -> bool + Send + Sync + 'static>;

#[derive(Clone)]
pub enum CheckPredicate {
    Status(u16),
    StatusIn(Vec<u16>),
    JsonPathExists(String),
    JsonPathEquals(String, serde_json::Value),
    DurationBelow(Duration),
    BodyContains(String),
    Custom(CheckFn),
}

impl fmt::Debug for CheckPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(s) => f.debug_tuple("Status").field(s).finish(),
            Self::StatusIn(s) => f.debug_tuple("StatusIn").field(s).finish(),
            Self::JsonPathExists(p) => f.debug_tuple("JsonPathExists").field(p).finish(),
            Self::JsonPathEquals(p, v) => f.debug_tuple("JsonPathEquals").field(p).field(v).finish(),
            Self::DurationBelow(d) => f.debug_tuple("DurationBelow").field(d).finish(),
            Self::BodyContains(s) => f.debug_tuple("BodyContains").field(s).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl CheckPredicate {
    /// Evaluate against `res`. A panicking custom predicate counts as a failure.
    pub fn evaluate(&self, res: &TargetResponse) -> bool {
        match self {
            Self::Status(s) => res.status == *s,
            Self::StatusIn(list) => list.contains(&res.status),
            Self::JsonPathExists(path) => res.json_path(path).is_some_and(|v| !v.is_null()),
            Self::JsonPathEquals(path, want) => res.json_path(path) == Some(want),
            Self::DurationBelow(limit) => !res.is_transport_error() && res.elapsed < *limit,
            Self::BodyContains(needle) => res.body_utf8().is_some_and(|b| b.contains(needle.as_str())),
            Self::Custom(f) => catch_unwind(AssertUnwindSafe(|| f(res))).unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Check {
    pub name: String,
    pub predicate: CheckPredicate,
}

impl Check {
    pub fn new(name: impl Into<String>, predicate: CheckPredicate) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }

    pub fn custom(
        name: impl Into<String>,
        f: impl Fn(&TargetResponse) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::new(name, CheckPredicate::Custom(Arc::new(f)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
}

/// Evaluate every check independently, in declaration order.
pub fn evaluate_checks(checks: &[Check], res: &TargetResponse) -> Vec<CheckResult> {
    checks
        .iter()
        .map(|c| CheckResult {
            name: c.name.clone(),
            passed: c.predicate.evaluate(res),
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct CheckMetricIds {
    pub checks: MetricId,
}

impl CheckMetricIds {
    pub fn register(metrics: &Registry) -> Result<Self> {
        Ok(Self {
            checks: metrics.register(CHECKS, MetricKind::Rate)?,
        })
    }

    /// One `checks` sample per result, tagged `check=<name>`.
    pub fn record(&self, metrics: &Registry, results: &[CheckResult], base_tags: &[(&str, &str)]) {
        let mut tags: Vec<(&str, &str)> = Vec::with_capacity(base_tags.len() + 1);
        for r in results {
            tags.clear();
            tags.extend(base_tags.iter().copied().filter(|(k, _)| *k != "check"));
            tags.push(("check", r.name.as_str()));
            if let Some(h) = metrics.get_handle(self.checks, metrics.resolve_tags(&tags)) {
                h.add_rate(r.passed);
            }
        }
    }
}
