use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr as _;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use surge_core::{
    Action, Check, CheckPredicate, Evaluation, MetricKind, RequestAction, RunOptions, RunPlan,
    Scenario, SetupCheck, SleepRange, Stage, ThresholdSet, WeightedAction,
};

mod interpolate;

use interpolate::Vars;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ScenarioDocYaml {
    /// Scenario name (metrics `scenario` tag). Defaults to the file stem.
    pub name: Option<String>,

    /// Defaults for `${NAME}` references.
    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub env: BTreeMap<String, String>,

    /// Scenario-level tags.
    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub tags: BTreeMap<String, String>,

    pub setup: Option<SetupYaml>,

    pub stages: Vec<StageYaml>,

    /// Think time after each iteration.
    pub pacing: Option<SleepYaml>,

    pub seed: Option<u64>,

    pub graceful_stop: Option<YamlDuration>,

    /// How often `continuous` thresholds are checked while the run is live.
    pub threshold_interval: Option<YamlDuration>,

    /// Custom metrics declared up front: `name: counter | gauge | rate | trend`.
    #[serde(default)]
    pub metrics: BTreeMap<String, String>,

    pub actions: Vec<ActionYaml>,

    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdExprYaml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct SetupYaml {
    pub url: String,
    pub expected_status: Option<u16>,
    pub timeout: Option<YamlDuration>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct StageYaml {
    pub duration: YamlDuration,
    pub target: u64,
}

/// Either a fixed duration or a `{ min, max }` range.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SleepYaml {
    Fixed(YamlDuration),
    Range { min: YamlDuration, max: YamlDuration },
}

impl SleepYaml {
    fn into_range(self) -> SleepRange {
        match self {
            Self::Fixed(d) => SleepRange::fixed(d.into_inner()),
            Self::Range { min, max } => SleepRange::new(min.into_inner(), max.into_inner()),
        }
    }
}

/// One action. Exactly one of the fields must be set.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ActionYaml {
    pub request: Option<Box<RequestYaml>>,
    pub sleep: Option<SleepYaml>,
    pub maybe: Option<Box<MaybeYaml>>,
    pub weighted: Option<Vec<WeightedYaml>>,
    pub group: Option<GroupYaml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct MaybeYaml {
    pub probability: f64,
    pub action: ActionYaml,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct WeightedYaml {
    pub weight: u32,
    pub action: ActionYaml,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct GroupYaml {
    pub name: String,
    pub actions: Vec<ActionYaml>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RequestYaml {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,
    /// Shorthand for the `name` tag.
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    /// JSON body; sets `content-type: application/json`.
    pub json: Option<serde_json::Value>,
    pub timeout: Option<YamlDuration>,
    /// Statuses accepted in addition to `200..=399`.
    #[serde(default)]
    pub expect_status: Vec<u16>,
    #[serde(default)]
    pub checks: Vec<CheckYaml>,
    pub success_metric: Option<String>,
    pub duration_metric: Option<String>,
    pub error_metric: Option<String>,
    pub log_json_path: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// A named check. Exactly one predicate field must be set.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct CheckYaml {
    pub name: String,
    pub status: Option<u16>,
    pub status_in: Option<Vec<u16>>,
    pub json_path_exists: Option<String>,
    pub json_path_equals: Option<JsonPathEqualsYaml>,
    pub duration_below: Option<YamlDuration>,
    pub body_contains: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct JsonPathEqualsYaml {
    pub path: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdExprYaml {
    One(ThresholdItemYaml),
    Many(Vec<ThresholdItemYaml>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdItemYaml {
    Expr(String),
    Detailed {
        threshold: String,
        #[serde(default)]
        continuous: bool,
    },
}

impl ThresholdItemYaml {
    fn into_pair(self) -> (String, Evaluation) {
        match self {
            Self::Expr(e) => (e, Evaluation::Final),
            Self::Detailed {
                threshold,
                continuous,
            } => {
                let evaluation = if continuous {
                    Evaluation::Continuous
                } else {
                    Evaluation::Final
                };
                (threshold, evaluation)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let secs = u64::try_from(v).map_err(|_| E::custom("duration must not be negative"))?;
                Ok(YamlDuration(Duration::from_secs(secs)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(|_| E::custom("duration must be a non-negative, finite number"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

fn deserialize_scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();

    for (k, v) in raw {
        let s = match v {
            serde_yaml::Value::Null => continue,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            _ => {
                return Err(serde::de::Error::custom(format!(
                    "`{k}` must be a string, number or bool"
                )));
            }
        };
        out.insert(k, s);
    }

    Ok(out)
}

/// Read and convert a scenario file. `overrides` is the process env with `--env` applied.
pub(crate) async fn load_plan(
    path: &Path,
    overrides: &BTreeMap<String, String>,
) -> anyhow::Result<RunPlan> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read scenario YAML: {}", path.display()))?;

    let default_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("default");

    parse_plan(&bytes, default_name, overrides)
        .with_context(|| format!("invalid scenario: {}", path.display()))
}

pub(crate) fn parse_plan(
    yaml: &[u8],
    default_name: &str,
    overrides: &BTreeMap<String, String>,
) -> anyhow::Result<RunPlan> {
    let doc: ScenarioDocYaml = serde_yaml::from_slice(yaml).context("failed to parse YAML")?;
    doc.into_plan(default_name, overrides)
}

impl ScenarioDocYaml {
    fn into_plan(
        self,
        default_name: &str,
        overrides: &BTreeMap<String, String>,
    ) -> anyhow::Result<RunPlan> {
        let vars = Vars::new(overrides, &self.env);

        let actions = self
            .actions
            .into_iter()
            .enumerate()
            .map(|(idx, a)| a.into_action(&vars).with_context(|| format!("actions[{idx}]")))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut scenario = Scenario::new(self.name.unwrap_or_else(|| default_name.to_string()), actions);
        scenario.tags = self.tags.into_iter().collect();
        if let Some(pacing) = self.pacing {
            scenario = scenario.with_pacing(pacing.into_range());
        }

        let stages = self
            .stages
            .into_iter()
            .map(|s| Stage::new(s.duration.into_inner(), s.target))
            .collect();
        let mut options = RunOptions::with_stages(stages);
        options.seed = self.seed;
        if let Some(d) = self.graceful_stop {
            options.graceful_stop = d.into_inner();
        }
        if let Some(d) = self.threshold_interval {
            options.threshold_interval = d.into_inner();
        }
        if let Some(setup) = self.setup {
            let mut check = SetupCheck::new(vars.expand(&setup.url).context("setup.url")?);
            if let Some(status) = setup.expected_status {
                check.expected_status = status;
            }
            if let Some(timeout) = setup.timeout {
                check.timeout = timeout.into_inner();
            }
            options.setup = Some(check);
        }

        let thresholds = self
            .thresholds
            .into_iter()
            .map(|(selector, exprs)| {
                let items = match exprs {
                    ThresholdExprYaml::One(item) => vec![item],
                    ThresholdExprYaml::Many(items) => items,
                };
                ThresholdSet::parse(&selector, items.into_iter().map(ThresholdItemYaml::into_pair))
            })
            .collect::<surge_core::Result<Vec<_>>>()?;

        let mut plan = RunPlan::new(options, scenario).with_thresholds(thresholds);
        for (name, kind) in self.metrics {
            let kind = MetricKind::from_str(&kind).map_err(|_| {
                anyhow::anyhow!(
                    "metric `{name}`: unknown kind `{kind}` (expected counter, gauge, rate or trend)"
                )
            })?;
            plan = plan.with_metric(name, kind);
        }

        Ok(plan)
    }
}

impl ActionYaml {
    fn into_action(self, vars: &Vars<'_>) -> anyhow::Result<Action> {
        let ActionYaml {
            request,
            sleep,
            maybe,
            weighted,
            group,
        } = self;

        let set = [
            request.is_some(),
            sleep.is_some(),
            maybe.is_some(),
            weighted.is_some(),
            group.is_some(),
        ]
        .into_iter()
        .filter(|s| *s)
        .count();
        if set != 1 {
            anyhow::bail!(
                "an action needs exactly one of `request`, `sleep`, `maybe`, `weighted` or `group` (found {set})"
            );
        }

        if let Some(req) = request {
            return Ok(Action::request(req.into_request(vars)?));
        }
        if let Some(sleep) = sleep {
            return Ok(Action::Sleep(sleep.into_range()));
        }
        if let Some(maybe) = maybe {
            let MaybeYaml {
                probability,
                action,
            } = *maybe;
            return Ok(Action::maybe(
                probability,
                action.into_action(vars).context("maybe.action")?,
            ));
        }
        if let Some(weighted) = weighted {
            let choices = weighted
                .into_iter()
                .enumerate()
                .map(|(idx, w)| {
                    Ok(WeightedAction {
                        weight: w.weight,
                        action: w
                            .action
                            .into_action(vars)
                            .with_context(|| format!("weighted[{idx}]"))?,
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            return Ok(Action::Weighted(choices));
        }

        let Some(group) = group else {
            anyhow::bail!("empty action");
        };
        let actions = group
            .actions
            .into_iter()
            .enumerate()
            .map(|(idx, a)| {
                a.into_action(vars)
                    .with_context(|| format!("group `{}` actions[{idx}]", group.name))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Action::Group {
            name: group.name,
            actions,
        })
    }
}

impl RequestYaml {
    fn into_request(self, vars: &Vars<'_>) -> anyhow::Result<RequestAction> {
        let method = http::Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .with_context(|| format!("invalid HTTP method `{}`", self.method))?;
        let url = vars.expand(&self.url).context("request.url")?;

        let mut req = RequestAction::new(method, url);

        match (self.body, self.json) {
            (Some(_), Some(_)) => anyhow::bail!("`body` and `json` are mutually exclusive"),
            (Some(body), None) => {
                req.body = Some(vars.expand(&body).context("request.body")?.into());
            }
            (None, Some(json)) => {
                let bytes = serde_json::to_vec(&json).context("request.json")?;
                req.body = Some(bytes.into());
                req = req.header("content-type", "application/json");
            }
            (None, None) => {}
        }

        for (name, value) in &self.headers {
            let value = vars
                .expand(value)
                .with_context(|| format!("header `{name}`"))?;
            req = req.header(name, &value);
        }
        for (k, v) in &self.tags {
            req = req.tag(k, v);
        }
        if let Some(name) = &self.name {
            req = req.named(name);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout.into_inner());
        }
        for status in self.expect_status {
            req = req.expect_status(status);
        }
        for check in self.checks {
            req = req.check(check.into_check()?);
        }
        if let Some(m) = &self.success_metric {
            req = req.success_metric(m);
        }
        if let Some(m) = &self.duration_metric {
            req = req.duration_metric(m);
        }
        if let Some(m) = &self.error_metric {
            req = req.error_metric(m);
        }
        if let Some(path) = &self.log_json_path {
            req = req.log_json_path(path);
        }

        Ok(req)
    }
}

impl CheckYaml {
    fn into_check(self) -> anyhow::Result<Check> {
        let mut predicates = Vec::new();
        if let Some(s) = self.status {
            predicates.push(CheckPredicate::Status(s));
        }
        if let Some(s) = self.status_in {
            predicates.push(CheckPredicate::StatusIn(s));
        }
        if let Some(p) = self.json_path_exists {
            predicates.push(CheckPredicate::JsonPathExists(p));
        }
        if let Some(eq) = self.json_path_equals {
            predicates.push(CheckPredicate::JsonPathEquals(eq.path, eq.value));
        }
        if let Some(d) = self.duration_below {
            predicates.push(CheckPredicate::DurationBelow(d.into_inner()));
        }
        if let Some(s) = self.body_contains {
            predicates.push(CheckPredicate::BodyContains(s));
        }

        let Some(predicate) = predicates.pop() else {
            anyhow::bail!("check `{}` has no predicate", self.name);
        };
        if !predicates.is_empty() {
            anyhow::bail!("check `{}` has more than one predicate", self.name);
        }
        Ok(Check::new(self.name, predicate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> anyhow::Result<RunPlan> {
        parse_plan(yaml.as_bytes(), "scenario", &BTreeMap::new())
    }

    fn parse_ok(yaml: &str) -> RunPlan {
        parse(yaml).unwrap_or_else(|e| panic!("{e:#}"))
    }

    const LOAD: &str = r#"
name: load
env:
  BASE_URL: http://localhost:8080
tags:
  team: payments
setup:
  url: ${BASE_URL}/health
stages:
  - { duration: 10s, target: 5 }
  - { duration: 1m, target: 20 }
  - { duration: 10s, target: 0 }
pacing: { min: 1s, max: 3s }
seed: 42
gracefulStop: 5s
metrics:
  queue_depth: gauge
actions:
  - request:
      url: ${BASE_URL}/api/process
      name: process
      timeout: 30s
      checks:
        - { name: status is 200, status: 200 }
        - { name: has trace id, jsonPathExists: data.trace_id }
        - { name: fast, durationBelow: 5000ms }
      successMetric: process_success_rate
      durationMetric: process_duration
      errorMetric: process_errors
      logJsonPath: data.trace_id
  - maybe:
      probability: 0.3
      action:
        request: { url: "${BASE_URL}/api/info", name: info }
  - weighted:
      - weight: 3
        action: { request: { url: "${BASE_URL}/stats" } }
      - weight: 1
        action: { sleep: 250ms }
  - group:
      name: monitoring
      actions:
        - request: { url: "${BASE_URL}/health", name: health }
thresholds:
  http_req_failed: rate<0.01
  http_req_duration:
    - p(95)<2000
    - { threshold: "max<10000", continuous: true }
  "http_req_duration{name:process}": ["p(99)<5000"]
  process_success_rate: rate>0.99
"#;

    #[test]
    fn parses_full_scenario() {
        let plan = parse_ok(LOAD);

        assert_eq!(plan.scenario.name, "load");
        assert_eq!(
            plan.scenario.tags,
            vec![("team".to_string(), "payments".to_string())]
        );
        assert_eq!(plan.options.stages.len(), 3);
        assert_eq!(plan.options.stages[1], Stage::new(Duration::from_secs(60), 20));
        assert_eq!(plan.options.seed, Some(42));
        assert_eq!(plan.options.graceful_stop, Duration::from_secs(5));
        assert_eq!(
            plan.scenario.pacing,
            SleepRange::new(Duration::from_secs(1), Duration::from_secs(3))
        );
        assert_eq!(
            plan.options.setup.as_ref().map(|s| s.url.as_str()),
            Some("http://localhost:8080/health")
        );
        assert_eq!(plan.metrics, vec![("queue_depth".to_string(), MetricKind::Gauge)]);
        assert_eq!(plan.scenario.actions.len(), 4);

        let Action::Request(process) = &plan.scenario.actions[0] else {
            panic!("expected request");
        };
        assert_eq!(process.url, "http://localhost:8080/api/process");
        assert_eq!(process.name(), Some("process"));
        assert_eq!(process.timeout, Duration::from_secs(30));
        assert_eq!(process.checks.len(), 3);
        assert_eq!(process.success_metric.as_deref(), Some("process_success_rate"));
        assert_eq!(process.log_json_path.as_deref(), Some("data.trace_id"));

        assert!(matches!(
            &plan.scenario.actions[1],
            Action::Conditional { probability, .. } if (*probability - 0.3).abs() < f64::EPSILON
        ));
        assert!(matches!(&plan.scenario.actions[2], Action::Weighted(w) if w.len() == 2));
        assert!(matches!(&plan.scenario.actions[3], Action::Group { name, .. } if name == "monitoring"));

        let duration = plan
            .thresholds
            .iter()
            .find(|t| t.selector == "http_req_duration")
            .unwrap_or_else(|| panic!("missing http_req_duration thresholds"));
        assert_eq!(duration.thresholds.len(), 2);
        assert_eq!(duration.thresholds[1].evaluation, Evaluation::Continuous);
        assert_eq!(plan.thresholds.len(), 4);

        if let Err(e) = plan.validate() {
            panic!("plan should validate: {e}");
        }
    }

    #[test]
    fn overrides_replace_file_env_defaults() {
        let overrides: BTreeMap<String, String> =
            [("BASE_URL".to_string(), "http://staging:9000".to_string())].into();
        let plan = parse_plan(LOAD.as_bytes(), "x", &overrides).unwrap_or_else(|e| panic!("{e:#}"));
        let Action::Request(process) = &plan.scenario.actions[0] else {
            panic!("expected request");
        };
        assert_eq!(process.url, "http://staging:9000/api/process");
    }

    #[test]
    fn name_defaults_to_file_stem() {
        let plan = parse_ok(
            "stages: [{ duration: 1s, target: 1 }]\nactions: [{ request: { url: \"http://x/health\" } }]",
        );
        assert_eq!(plan.scenario.name, "scenario");
        assert!(plan.thresholds.is_empty());
        assert_eq!(plan.scenario.pacing, SleepRange::ZERO);
    }

    #[test]
    fn overload_statuses_and_json_bodies() {
        let plan = parse_ok(
            r#"
stages: [{ duration: 1s, target: 1 }]
actions:
  - request:
      method: post
      url: http://x/api/process
      json: { id: 7 }
      headers: { x-request-id: abc }
      expectStatus: [503]
      checks:
        - { name: ok or overloaded, statusIn: [200, 503] }
        - name: healthy
          jsonPathEquals: { path: status, value: healthy }
"#,
        );
        let Action::Request(req) = &plan.scenario.actions[0] else {
            panic!("expected request");
        };
        assert_eq!(req.method, http::Method::POST);
        assert_eq!(req.body.as_deref(), Some(&b"{\"id\":7}"[..]));
        assert!(req.headers.contains(&("content-type".to_string(), "application/json".to_string())));
        assert!(req.expected_statuses.contains(503));
        assert!(req.expected_statuses.contains(200));
        assert!(!req.expected_statuses.contains(500));
        assert!(matches!(
            &req.checks[1].predicate,
            CheckPredicate::JsonPathEquals(path, serde_json::Value::String(v)) if path == "status" && v == "healthy"
        ));
    }

    #[test]
    fn rejects_ambiguous_or_empty_actions() {
        let both = "stages: [{ duration: 1s, target: 1 }]\nactions:\n  - { sleep: 1s, request: { url: \"http://x\" } }";
        assert!(parse(both).is_err());

        let none = "stages: [{ duration: 1s, target: 1 }]\nactions:\n  - {}";
        assert!(parse(none).is_err());
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        let unknown = "stages: [{ duration: 1s, target: 1 }]\nactions: []\nramp: true";
        assert!(parse(unknown).is_err());

        let bad_duration = "stages: [{ duration: 10x, target: 1 }]\nactions: []";
        assert!(parse(bad_duration).is_err());

        let bad_kind = "stages: [{ duration: 1s, target: 1 }]\nactions: []\nmetrics: { x: histogram }";
        assert!(parse(bad_kind).is_err());

        let undefined_var = "stages: [{ duration: 1s, target: 1 }]\nactions: [{ request: { url: \"${NOPE}/x\" } }]";
        assert!(parse(undefined_var).is_err());

        let bad_threshold = "stages: [{ duration: 1s, target: 1 }]\nactions: []\nthresholds: { http_req_failed: rate<<1 }";
        assert!(parse(bad_threshold).is_err());

        let two_predicates = "stages: [{ duration: 1s, target: 1 }]\nactions:\n  - request:\n      url: http://x\n      checks: [{ name: c, status: 200, bodyContains: ok }]";
        assert!(parse(two_predicates).is_err());
    }

    #[test]
    fn durations_accept_numbers_and_strings() {
        let plan = parse_ok(
            "stages:\n  - { duration: 2, target: 1 }\n  - { duration: 0.5, target: 1 }\n  - { duration: 1m30s, target: 0 }\npacing: 0\nactions: [{ sleep: { min: 0, max: 500ms } }]",
        );
        let durations: Vec<_> = plan.options.stages.iter().map(|s| s.duration).collect();
        assert_eq!(
            durations,
            vec![
                Duration::from_secs(2),
                Duration::from_millis(500),
                Duration::from_secs(90)
            ]
        );
        assert!(matches!(
            &plan.scenario.actions[0],
            Action::Sleep(r) if *r == SleepRange::new(Duration::ZERO, Duration::from_millis(500))
        ));
    }

    #[test]
    fn bundled_demos_validate() {
        for (name, yaml) in [
            ("load", include_str!("../../demos/load.yaml")),
            ("spike", include_str!("../../demos/spike.yaml")),
            ("smoke", include_str!("../../demos/smoke.yaml")),
            ("stress", include_str!("../../demos/stress.yaml")),
        ] {
            let plan = parse_plan(yaml.as_bytes(), name, &BTreeMap::new())
                .unwrap_or_else(|e| panic!("{name}: {e:#}"));
            assert_eq!(plan.scenario.name, name);
            if let Err(e) = plan.validate() {
                panic!("{name}: {e}");
            }
        }
    }

    #[test]
    fn stress_demo_steps_up_to_200_vus() {
        let plan = parse_plan(
            include_str!("../../demos/stress.yaml").as_bytes(),
            "stress",
            &BTreeMap::new(),
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(plan.options.stages.len(), 9);
        assert_eq!(plan.options.stages.iter().map(|s| s.target).max(), Some(200));
        let Some(Action::Request(req)) = plan.scenario.actions.first() else {
            panic!("expected a request action");
        };
        assert_eq!(req.timeout, Duration::from_secs(30));
        assert_eq!(req.success_metric.as_deref(), Some("success_rate"));
        assert_eq!(req.error_metric.as_deref(), Some("errors"));
        assert_eq!(plan.thresholds.len(), 3);
    }

    #[test]
    fn load_demo_targets_both_services() {
        let overrides = BTreeMap::from([
            ("BASE_URL".to_string(), "http://gw".to_string()),
            ("SERVICE_A_URL".to_string(), "http://svc".to_string()),
        ]);
        let plan = parse_plan(
            include_str!("../../demos/load.yaml").as_bytes(),
            "load",
            &overrides,
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(
            plan.options.setup.as_ref().map(|s| s.url.as_str()),
            Some("http://gw/health")
        );
        let urls: Vec<&str> = plan
            .scenario
            .requests()
            .into_iter()
            .map(|r| r.url.as_str())
            .collect();
        assert!(urls.contains(&"http://svc/stats"), "{urls:?}");
        assert!(urls.contains(&"http://gw/health"), "{urls:?}");
        assert!(urls.contains(&"http://svc/health"), "{urls:?}");
    }
}
