mod checks;
mod config;
mod error;
mod executor;
mod iteration_metrics;
mod metrics_context;
mod progress;
mod request_metrics;
mod run;
mod scenario;
mod schedule;
mod summary;
mod thresholds;
mod thresholds_eval;
mod vu;

pub use checks::{CHECKS, Check, CheckFn, CheckPredicate, CheckResult, evaluate_checks};
pub use config::{RunOptions, SetupCheck, Stage, validate_stages};
pub use error::{Error, Result};
pub use executor::{TargetExecutor, TargetResponse, TransportError, json_path};
pub use iteration_metrics::{ITERATION_DURATION, ITERATIONS, VUS, VUS_MAX};
pub use metrics_context::MetricsContext;
pub use progress::{LiveMetrics, ProgressFn, ProgressUpdate, StageProgress};
pub use request_metrics::{
    DATA_RECEIVED, DATA_SENT, HTTP_REQ_DURATION, HTTP_REQ_ERRORS, HTTP_REQ_FAILED, HTTP_REQS,
};
pub use run::{RunPlan, run};
pub use scenario::{
    Action, ExpectedStatuses, RequestAction, Scenario, SleepRange, WeightedAction,
};
pub use schedule::{Population, PopulationDelta, StageSchedule, StageSnapshot};
pub use summary::{CheckSummary, MetricSummary, RunResult};
pub use thresholds::{
    Evaluation, MetricSelector, ThresholdAgg, ThresholdDef, ThresholdExpr, ThresholdOp,
    ThresholdSet, parse_threshold_expr,
};
pub use thresholds_eval::{ThresholdOutcome, evaluate_all, evaluate_thresholds, validate_thresholds};
pub use vu::{StopSignal, VuState};

pub use surge_http::TransportErrorKind;
pub use surge_metrics::{MetricKind, MetricSeriesSummary, MetricValue, TrendSummary};
